//! Core services of the monitor.
//!
//! - `blockchain`: Chain clients, transports and the connection registry
//! - `events`: Broadcast of monitoring events
//! - `explorer`: Etherscan-style explorer API client
//! - `health`: Heartbeat probes and reconnection
//! - `monitor`: The monitoring engine
//! - `ratelimit`: Shared request-rate governor

pub mod blockchain;
pub mod events;
pub mod explorer;
pub mod health;
pub mod monitor;
pub mod ratelimit;
