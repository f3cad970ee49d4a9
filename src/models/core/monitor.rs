//! Registration options and tracked entries of the monitoring engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::models::NetworkId;

/// Key of the native balance inside [`MonitoredAddress::last_balances`]
pub const NATIVE_BALANCE_KEY: &str = "native";

/// NFT token standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NftStandard {
	#[serde(rename = "ERC721")]
	Erc721,
	#[serde(rename = "ERC1155")]
	Erc1155,
}

impl std::fmt::Display for NftStandard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Erc721 => f.write_str("ERC721"),
			Self::Erc1155 => f.write_str("ERC1155"),
		}
	}
}

/// Options of a balance registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressOptions {
	#[serde(default = "default_true")]
	pub track_balance: bool,
	/// Token symbols resolved through the network's token table
	#[serde(default)]
	pub tokens: Vec<String>,
}

fn default_true() -> bool {
	true
}

impl Default for AddressOptions {
	fn default() -> Self {
		Self {
			track_balance: true,
			tokens: Vec::new(),
		}
	}
}

/// Options of an NFT transfer registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOptions {
	#[serde(default)]
	pub contract_addresses: Vec<String>,
	/// Empty means both standards
	#[serde(default)]
	pub standards: Vec<NftStandard>,
}

/// Options of a collection-wide registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
	pub standard: NftStandard,
}

impl Default for CollectionOptions {
	fn default() -> Self {
		Self {
			standard: NftStandard::Erc721,
		}
	}
}

/// Address tracked for native and token balance changes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredAddress {
	pub network: NetworkId,
	pub address: String,
	pub track_balance: bool,
	/// Upper-case token symbols
	pub tokens: BTreeSet<String>,
	/// Last observed balances as canonical decimal strings
	pub last_balances: HashMap<String, String>,
	pub last_checked: Option<DateTime<Utc>>,
}

impl MonitoredAddress {
	pub fn new(network: NetworkId, address: String, options: &AddressOptions) -> Self {
		Self {
			network,
			address,
			track_balance: options.track_balance,
			tokens: options
				.tokens
				.iter()
				.map(|symbol| symbol.trim().to_ascii_uppercase())
				.filter(|symbol| !symbol.is_empty())
				.collect(),
			last_balances: HashMap::new(),
			last_checked: None,
		}
	}

	/// Whether a check pass has anything to fetch for this entry
	pub fn has_balance_interest(&self) -> bool {
		self.track_balance || !self.tokens.is_empty()
	}
}

/// Address tracked for NFT transfers on a set of contracts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoredNft {
	pub network: NetworkId,
	pub address: String,
	/// Canonical contract addresses
	pub contract_addresses: BTreeSet<String>,
	pub standards: BTreeSet<NftStandard>,
	pub last_checked: Option<DateTime<Utc>>,
}

impl MonitoredNft {
	pub fn accepts(&self, contract: &str, standard: NftStandard) -> bool {
		self.contract_addresses.contains(contract)
			&& (self.standards.is_empty() || self.standards.contains(&standard))
	}
}

/// Contract whose every transfer is reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredCollection {
	pub network: NetworkId,
	/// Canonical contract address
	pub contract: String,
	pub standard: NftStandard,
}
