//! Events emitted by the monitoring engine.
//!
//! Events are published on a broadcast channel; consumers such as balance displays or
//! notification services subscribe through `MonitoringEngine::subscribe`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{NetworkId, NftStandard};

/// Whether a balance change concerns the native currency or a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceKind {
	Native,
	Token,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
	pub network: NetworkId,
	pub block_number: u64,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
	#[serde(rename = "type")]
	pub kind: BalanceKind,
	pub network: NetworkId,
	pub address: String,
	/// Native currency symbol or token symbol
	pub symbol: String,
	pub previous_balance: String,
	pub new_balance: String,
	/// Signed difference `new - previous`
	pub change: Decimal,
	pub timestamp: DateTime<Utc>,
}

/// A single NFT transfer, batch transfers are decomposed per token id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftTransfer {
	pub network: NetworkId,
	pub contract: String,
	/// Decimal token id
	pub token_id: String,
	pub from: String,
	pub to: String,
	/// ERC1155 operator, absent for ERC721
	pub operator: Option<String>,
	/// Transferred amount, always `1` for ERC721
	pub value: String,
	pub standard: NftStandard,
	pub tx_hash: Option<String>,
	pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipDirection {
	Send,
	Receive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOwnershipChange {
	pub network: NetworkId,
	/// Monitored address the change is relative to
	pub address: String,
	pub direction: OwnershipDirection,
	pub transfer: NftTransfer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum MonitorEvent {
	NewBlock(NewBlock),
	BalanceChange(BalanceChange),
	NftTransfer(NftTransfer),
	NftOwnershipChange(NftOwnershipChange),
	#[serde(rename_all = "camelCase")]
	ProviderReconnected { network: NetworkId },
	#[serde(rename_all = "camelCase")]
	ProviderError {
		network: NetworkId,
		error: String,
		reconnect_attempts: u32,
	},
}

impl MonitorEvent {
	/// Event name as used in metrics labels
	pub fn name(&self) -> &'static str {
		match self {
			Self::NewBlock(_) => "newBlock",
			Self::BalanceChange(_) => "balanceChange",
			Self::NftTransfer(_) => "nftTransfer",
			Self::NftOwnershipChange(_) => "nftOwnershipChange",
			Self::ProviderReconnected { .. } => "providerReconnected",
			Self::ProviderError { .. } => "providerError",
		}
	}

	pub fn network(&self) -> NetworkId {
		match self {
			Self::NewBlock(event) => event.network,
			Self::BalanceChange(event) => event.network,
			Self::NftTransfer(event) => event.network,
			Self::NftOwnershipChange(event) => event.network,
			Self::ProviderReconnected { network } => *network,
			Self::ProviderError { network, .. } => *network,
		}
	}
}
