//! Monitoring engine error types.

use thiserror::Error;

use crate::{
	models::NetworkId,
	services::{blockchain::BlockChainError, ratelimit::RateLimitError},
};

#[derive(Debug, Error)]
pub enum MonitorError {
	/// The network has no configuration in this engine
	#[error("Network {0} is not configured")]
	UnsupportedNetwork(NetworkId),

	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	/// The network does not offer the requested kind of monitoring
	#[error("Unsupported: {0}")]
	Unsupported(String),

	#[error("Initialization error: {0}")]
	InitializationError(String),

	#[error("Monitoring engine destroyed")]
	Destroyed,

	#[error(transparent)]
	RateLimited(#[from] RateLimitError),

	#[error(transparent)]
	Blockchain(#[from] BlockChainError),
}

impl MonitorError {
	pub fn invalid_address(msg: impl Into<String>) -> Self {
		Self::InvalidAddress(msg.into())
	}

	pub fn unsupported(msg: impl Into<String>) -> Self {
		Self::Unsupported(msg.into())
	}

	pub fn initialization_error(msg: impl Into<String>) -> Self {
		Self::InitializationError(msg.into())
	}
}
