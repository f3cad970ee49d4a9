//! Watch list of the service binary.
//!
//! Lists the registrations performed at startup. Library callers register through
//! the engine directly and never need this file.

use serde::{Deserialize, Serialize};

use crate::models::{
	AddressOptions, CollectionOptions, ConfigError, ConfigLoader, NetworkId, NftOptions,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAddress {
	pub network: NetworkId,
	pub address: String,
	#[serde(flatten)]
	pub options: AddressOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedNftTransfers {
	pub network: NetworkId,
	pub address: String,
	#[serde(flatten)]
	pub options: NftOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedCollection {
	pub network: NetworkId,
	pub contract: String,
	#[serde(flatten)]
	pub options: CollectionOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchList {
	pub addresses: Vec<WatchedAddress>,
	pub nft_transfers: Vec<WatchedNftTransfers>,
	pub collections: Vec<WatchedCollection>,
}

impl WatchList {
	pub fn is_empty(&self) -> bool {
		self.addresses.is_empty() && self.nft_transfers.is_empty() && self.collections.is_empty()
	}
}

impl ConfigLoader for WatchList {
	const DEFAULT_PATH: &'static str = "config/watch.json";

	fn validate(&self) -> Result<(), ConfigError> {
		for entry in &self.addresses {
			entry
				.network
				.normalize_address(&entry.address)
				.map_err(ConfigError::validation_error)?;
		}
		for entry in &self.nft_transfers {
			entry
				.network
				.normalize_address(&entry.address)
				.map_err(ConfigError::validation_error)?;
			if !entry.network.is_evm_like() {
				return Err(ConfigError::validation_error(format!(
					"NFT transfer monitoring is not available on {}",
					entry.network
				)));
			}
		}
		for entry in &self.collections {
			entry
				.network
				.normalize_address(&entry.contract)
				.map_err(ConfigError::validation_error)?;
		}
		Ok(())
	}
}
