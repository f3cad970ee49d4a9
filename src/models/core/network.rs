//! Network identifiers and connection details.
//!
//! The set of supported networks is fixed: a handful of EVM chains sharing the same
//! JSON-RPC and contract model, plus Solana.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// Size of a decoded Solana public key
const SOLANA_PUBKEY_LEN: usize = 32;

/// Execution environment of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
	Evm,
	Solana,
}

/// Identifier of a supported network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
	Ethereum,
	Polygon,
	Bsc,
	Arbitrum,
	Optimism,
	Base,
	Avalanche,
	Solana,
}

impl NetworkId {
	pub const ALL: [NetworkId; 8] = [
		NetworkId::Ethereum,
		NetworkId::Polygon,
		NetworkId::Bsc,
		NetworkId::Arbitrum,
		NetworkId::Optimism,
		NetworkId::Base,
		NetworkId::Avalanche,
		NetworkId::Solana,
	];

	pub fn slug(&self) -> &'static str {
		match self {
			Self::Ethereum => "ethereum",
			Self::Polygon => "polygon",
			Self::Bsc => "bsc",
			Self::Arbitrum => "arbitrum",
			Self::Optimism => "optimism",
			Self::Base => "base",
			Self::Avalanche => "avalanche",
			Self::Solana => "solana",
		}
	}

	pub fn kind(&self) -> ChainKind {
		match self {
			Self::Solana => ChainKind::Solana,
			_ => ChainKind::Evm,
		}
	}

	/// Whether the network speaks the Ethereum JSON-RPC and contract model
	pub fn is_evm_like(&self) -> bool {
		self.kind() == ChainKind::Evm
	}

	pub fn native_symbol(&self) -> &'static str {
		match self {
			Self::Ethereum | Self::Arbitrum | Self::Optimism | Self::Base => "ETH",
			Self::Polygon => "POL",
			Self::Bsc => "BNB",
			Self::Avalanche => "AVAX",
			Self::Solana => "SOL",
		}
	}

	pub fn native_decimals(&self) -> u8 {
		match self.kind() {
			ChainKind::Evm => 18,
			ChainKind::Solana => 9,
		}
	}

	/// Validates an address for this network and returns its canonical form
	///
	/// EVM addresses are lowercased with a `0x` prefix so that lookups are case
	/// insensitive. Solana addresses are base58 and case sensitive; they are kept as
	/// given once they decode to a 32 byte public key.
	///
	/// # Arguments
	/// * `address` - The address as provided by the caller
	///
	/// # Returns
	/// * `Result<String, String>` - Canonical address or a description of the problem
	pub fn normalize_address(&self, address: &str) -> Result<String, String> {
		let trimmed = address.trim();
		match self.kind() {
			ChainKind::Evm => Address::from_str(trimmed)
				.map(|parsed| alloy::hex::encode_prefixed(parsed.as_slice()))
				.map_err(|e| format!("Invalid EVM address '{}': {}", trimmed, e)),
			ChainKind::Solana => {
				let bytes = bs58::decode(trimmed)
					.into_vec()
					.map_err(|e| format!("Invalid Solana address '{}': {}", trimmed, e))?;
				if bytes.len() != SOLANA_PUBKEY_LEN {
					return Err(format!(
						"Invalid Solana address '{}': {} bytes, expected {}",
						trimmed,
						bytes.len(),
						SOLANA_PUBKEY_LEN
					));
				}
				Ok(trimmed.to_string())
			}
		}
	}
}

impl fmt::Display for NetworkId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.slug())
	}
}

impl FromStr for NetworkId {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let lowered = s.trim().to_ascii_lowercase();
		Self::ALL
			.iter()
			.find(|network| network.slug() == lowered)
			.copied()
			.ok_or_else(|| format!("Unsupported network: {}", s))
	}
}

/// RPC endpoint of a network
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RpcUrl {
	/// Either `rpc` (HTTP JSON-RPC) or `ws_rpc` (WebSocket JSON-RPC)
	pub type_: String,
	pub url: String,
	pub weight: u32,
}

/// Fungible token tracked by symbol on a network
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenConfig {
	/// ERC20 contract address or SPL mint address
	pub address: String,
	pub decimals: u8,
}

/// Connection details of a single network
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
	pub network: NetworkId,
	pub name: String,
	pub rpc_urls: Vec<RpcUrl>,
	#[serde(default)]
	pub chain_id: Option<u64>,
	/// Token table keyed by upper-case symbol
	#[serde(default)]
	pub tokens: HashMap<String, TokenConfig>,
}

impl NetworkConfig {
	/// Endpoint URLs with a positive weight, highest weight first
	pub fn endpoint_urls(&self) -> Vec<String> {
		let mut urls: Vec<&RpcUrl> = self.rpc_urls.iter().filter(|u| u.weight > 0).collect();
		urls.sort_by(|a, b| b.weight.cmp(&a.weight));
		urls.into_iter().map(|u| u.url.clone()).collect()
	}

	pub fn token(&self, symbol: &str) -> Option<&TokenConfig> {
		self.tokens
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(symbol))
			.map(|(_, token)| token)
	}
}
