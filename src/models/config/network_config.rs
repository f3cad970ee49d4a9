//! Network configuration loading and validation.
//!
//! This module implements the ConfigLoader trait for network definitions,
//! allowing networks to be loaded from JSON files.

use std::collections::HashSet;

use crate::models::{ChainKind, ConfigError, ConfigLoader, NetworkConfig};

impl ConfigLoader for NetworkConfig {
	const DEFAULT_PATH: &'static str = "config/networks";

	/// Validate the network configuration
	///
	/// Checks:
	/// - at least one endpoint with a positive weight
	/// - endpoint types are `rpc` or `ws_rpc` with a matching URL scheme
	/// - weights are between 0 and 100
	/// - tokens carry an address that is valid for the chain
	fn validate(&self) -> Result<(), ConfigError> {
		if self.name.trim().is_empty() {
			return Err(ConfigError::validation_error("Network name is required"));
		}

		if self.endpoint_urls().is_empty() {
			return Err(ConfigError::validation_error(format!(
				"Network {} has no RPC URL with a positive weight",
				self.network
			)));
		}

		let mut seen = HashSet::new();
		for rpc_url in &self.rpc_urls {
			let scheme_ok = match rpc_url.type_.as_str() {
				"rpc" => rpc_url.url.starts_with("http://") || rpc_url.url.starts_with("https://"),
				"ws_rpc" => rpc_url.url.starts_with("ws://") || rpc_url.url.starts_with("wss://"),
				other => {
					return Err(ConfigError::validation_error(format!(
						"RPC URL type must be one of: rpc, ws_rpc (got {})",
						other
					)))
				}
			};
			if !scheme_ok {
				return Err(ConfigError::validation_error(format!(
					"RPC URL {} does not match its type {}",
					rpc_url.url, rpc_url.type_
				)));
			}
			if rpc_url.weight > 100 {
				return Err(ConfigError::validation_error(
					"All RPC URL weights must be between 0 and 100",
				));
			}
			if !seen.insert(rpc_url.url.as_str()) {
				return Err(ConfigError::validation_error(format!(
					"Duplicate RPC URL: {}",
					rpc_url.url
				)));
			}
		}

		if self.chain_id.is_none() && self.network.kind() == ChainKind::Evm {
			tracing::debug!(network = %self.network, "No chain id configured");
		}

		for (symbol, token) in &self.tokens {
			self.network
				.normalize_address(&token.address)
				.map_err(|e| ConfigError::validation_error(format!("Token {}: {}", symbol, e)))?;
		}

		Ok(())
	}
}
