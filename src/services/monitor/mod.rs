//! Balance and NFT monitoring.
//!
//! - `engine`: registrations, timers, subscriptions and event emission
//! - `nft`: transfer log decoding and matching
//! - `state`: tracking sets, balance diffing and task handles

mod engine;
mod error;
mod nft;
mod state;

pub use engine::{MonitoringEngine, MAX_LOG_RANGE};
pub use error::MonitorError;
pub use nft::{decode_transfer_log, dispatch_transfer};
pub use state::{balance_key, blocks_key, nft_key};
