//! Blockchain client implementations.
//!
//! - EVM client for Ethereum-compatible chains
//! - Solana client
//! - Solidity interfaces of the token standards the EVM client reads
//!
//! Both are generic over their transport so the same client logic runs over HTTP
//! and WebSocket endpoints.

pub mod abi;
mod evm;
mod solana;

pub use abi::{TRANSFER_BATCH_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_TOPIC};
pub use evm::EvmClient;
pub use solana::SolanaClient;
