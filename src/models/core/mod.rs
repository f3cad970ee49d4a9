//! Core domain models of the monitoring subsystem.
//!
//! This module contains the fundamental data structures that represent:
//! - Networks: Supported chains and their connection details
//! - Connections: Status records of live connections
//! - Monitoring: Registration options and tracked entries
//! - Events: Notifications published by the monitoring engine

mod connection;
mod event;
mod monitor;
mod network;

pub use connection::{ConnectionState, ConnectionStatus, Liveness};
pub use event::{
	BalanceChange, BalanceKind, MonitorEvent, NewBlock, NftOwnershipChange, NftTransfer,
	OwnershipDirection,
};
pub use monitor::{
	AddressOptions, CollectionOptions, MonitoredAddress, MonitoredCollection, MonitoredNft,
	NftOptions, NftStandard, NATIVE_BALANCE_KEY,
};
pub use network::{ChainKind, NetworkConfig, NetworkId, RpcUrl, TokenConfig};
