//! Blockchain client interfaces and implementations.
//!
//! Provides abstractions and concrete implementations for interacting with
//! different blockchain networks. Includes:
//!
//! - Object safe client trait shared by every chain
//! - EVM and Solana clients
//! - HTTP and WebSocket JSON-RPC transports
//! - Endpoint rotation and the per-network connection registry
//! - Error handling for blockchain operations

mod client;
mod clients;
mod endpoint_manager;
mod error;
mod factory;
mod registry;
mod transports;

pub use client::{Balance, BlockHeader, ChainClient, ClientCapabilities, RawLog};
pub use clients::{
	abi, EvmClient, SolanaClient, TRANSFER_BATCH_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_TOPIC,
};
pub use endpoint_manager::EndpointManager;
pub use error::BlockChainError;
pub use factory::{ClientFactory, DefaultClientFactory};
pub use registry::ConnectionRegistry;
pub use transports::{
	extract_result, BlockchainTransport, HttpTransportClient, WsConfig, WsTransportClient,
};
