//! Multi-chain balance and NFT monitoring library.
//!
//! Watches native and token balances and NFT transfers across EVM networks and
//! Solana. Connections are shared per network, probed by a heartbeat and restored by a
//! reconnection state machine. Every outbound call goes through a shared rate governor.
//!
//! # Layout
//! - `models`: Networks, tracked entries, events and configuration
//! - `services`: Chain clients, rate governor, health supervision and the engine
//! - `utils`: Logging, metrics, retry, pagination and parsing helpers

pub mod models;
pub mod services;
pub mod utils;
