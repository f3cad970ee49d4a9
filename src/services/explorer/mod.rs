//! Block explorer access for NFT transfer history.

mod client;
mod error;

pub use client::{ExplorerClient, ExplorerConfig};
pub use error::ExplorerError;
