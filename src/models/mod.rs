//! Domain models and data structures for chain monitoring.
//!
//! - `config`: Configuration loading and validation
//! - `core`: Core domain models (networks, connections, tracked entries, events)

mod config;
mod core;

pub use core::{
	AddressOptions, BalanceChange, BalanceKind, ChainKind, CollectionOptions, ConnectionState,
	ConnectionStatus, Liveness, MonitorEvent, MonitoredAddress, MonitoredCollection, MonitoredNft,
	NetworkConfig, NetworkId, NewBlock, NftOptions, NftOwnershipChange, NftStandard, NftTransfer,
	OwnershipDirection, RpcUrl, TokenConfig, NATIVE_BALANCE_KEY,
};

pub use config::{
	ConfigError, ConfigLoader, MonitorConfig, ResourceLimit, WatchList, WatchedAddress,
	WatchedCollection, WatchedNftTransfers,
};
