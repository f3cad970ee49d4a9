//! Core blockchain client interface.
//!
//! Every supported chain is reached through a [`ChainClient`] handle. The handle is
//! object safe so that the connection registry can hold EVM and Solana clients side
//! by side and swap them on reconnection. What a handle can do beyond plain reads is
//! advertised through [`ClientCapabilities`] rather than probed at call sites.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
	models::{NetworkId, TokenConfig},
	services::blockchain::BlockChainError,
	utils::parsing::format_units,
};

/// Optional features of a client handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCapabilities {
	/// Protocol-level ping with latency measurement
	pub ping: bool,
	/// Push notifications for new blocks
	pub block_subscription: bool,
	/// Contract event log queries (NFT transfer detection)
	pub contract_logs: bool,
}

/// Amount in base units together with its scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
	pub raw: U256,
	pub decimals: u8,
}

impl Balance {
	pub fn new(raw: U256, decimals: u8) -> Self {
		Self { raw, decimals }
	}

	/// Canonical decimal string, see [`format_units`]
	pub fn formatted(&self) -> String {
		format_units(self.raw, self.decimals)
	}
}

/// New block (or slot) notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
	pub number: u64,
	/// Unix seconds, when the chain reports it
	pub timestamp: Option<u64>,
}

/// Undecoded contract event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub block_number: Option<u64>,
	pub transaction_hash: Option<B256>,
	pub log_index: Option<u64>,
}

/// Handle to one network through one endpoint
#[async_trait]
pub trait ChainClient: Send + Sync {
	fn network(&self) -> NetworkId;

	/// URL of the endpoint behind this handle
	fn endpoint(&self) -> String;

	fn capabilities(&self) -> ClientCapabilities;

	/// Latest block number (slot height on Solana)
	async fn get_block_number(&self) -> Result<u64, BlockChainError>;

	async fn get_native_balance(&self, address: &str) -> Result<Balance, BlockChainError>;

	async fn get_token_balance(
		&self,
		address: &str,
		token: &TokenConfig,
	) -> Result<Balance, BlockChainError>;

	/// ERC721/ERC1155 transfer logs emitted by `contract` in `[from_block, to_block]`
	async fn get_transfer_logs(
		&self,
		contract: &str,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawLog>, BlockChainError>;

	/// Protocol-level ping, only meaningful when `capabilities().ping` is set
	async fn ping(&self) -> Result<Duration, BlockChainError>;

	/// Stream of new block headers, ending when the connection is lost
	async fn subscribe_blocks(&self) -> Result<mpsc::Receiver<BlockHeader>, BlockChainError>;

	/// Releases transport resources, best effort
	async fn close(&self);
}
