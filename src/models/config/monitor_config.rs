//! Engine tuning: polling cadence, reconnection backoff, liveness windows and rate limits.
//!
//! Every field is optional in the JSON form and falls back to the defaults below.
//! Durations are expressed in milliseconds.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

use crate::models::{config::millis, ConfigError, ConfigLoader};

/// Throughput allowance of one rate-governed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceLimit {
	/// Requests admitted per refill interval
	pub max_requests: u32,
	#[serde(with = "millis")]
	pub interval: Duration,
	/// Waiters allowed in the FIFO queue once the bucket is empty
	pub max_queue: usize,
	/// Longest a caller may wait in the queue
	#[serde(with = "millis")]
	pub timeout: Duration,
	/// Fail with an error on overflow instead of skipping silently
	pub error_on_limit: bool,
}

impl ResourceLimit {
	/// EVM JSON-RPC endpoints
	pub fn evm_rpc() -> Self {
		Self {
			max_requests: 25,
			interval: Duration::from_secs(1),
			max_queue: 200,
			timeout: Duration::from_secs(30),
			error_on_limit: true,
		}
	}

	/// Solana JSON-RPC endpoints
	pub fn solana_rpc() -> Self {
		Self {
			max_requests: 40,
			..Self::evm_rpc()
		}
	}

	/// Block explorers and indexers
	pub fn explorer() -> Self {
		Self {
			max_requests: 5,
			interval: Duration::from_secs(1),
			max_queue: 50,
			timeout: Duration::from_secs(60),
			error_on_limit: true,
		}
	}

	/// Third-party marketplace APIs
	pub fn marketplace() -> Self {
		Self {
			max_requests: 2,
			interval: Duration::from_secs(1),
			max_queue: 20,
			timeout: Duration::from_secs(60),
			error_on_limit: true,
		}
	}
}

impl Default for ResourceLimit {
	fn default() -> Self {
		Self::evm_rpc()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
	/// Cadence of the balance/NFT safety-net poll per network
	#[serde(with = "millis")]
	pub polling_interval: Duration,
	/// Cadence of NFT contract log queries
	#[serde(with = "millis")]
	pub requery_interval: Duration,
	/// Base delay of the reconnection backoff
	#[serde(with = "millis")]
	pub reconnect_delay: Duration,
	#[serde(with = "millis")]
	pub max_reconnect_delay: Duration,
	/// Attempts before a reconnection is reported as failed
	pub reconnect_attempts: u32,
	/// Cadence of per-network liveness probes
	#[serde(with = "millis")]
	pub heartbeat_interval: Duration,
	/// Cadence of the global staleness sweep
	#[serde(with = "millis")]
	pub health_check_interval: Duration,
	/// Probe and verification timeout
	#[serde(with = "millis")]
	pub ping_timeout: Duration,
	/// Capacity of the event broadcast channel
	pub event_buffer: usize,
	/// Rate limit overrides keyed by resource key (`rpc:ethereum`, `explorer:etherscan`)
	pub rate_limits: HashMap<String, ResourceLimit>,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			polling_interval: Duration::from_secs(15),
			requery_interval: Duration::from_secs(60),
			reconnect_delay: Duration::from_secs(1),
			max_reconnect_delay: Duration::from_secs(60),
			reconnect_attempts: 5,
			heartbeat_interval: Duration::from_secs(30),
			health_check_interval: Duration::from_secs(60),
			ping_timeout: Duration::from_secs(10),
			event_buffer: 1024,
			rate_limits: HashMap::new(),
		}
	}
}

impl ConfigLoader for MonitorConfig {
	const DEFAULT_PATH: &'static str = "config/monitor.json";

	fn validate(&self) -> Result<(), ConfigError> {
		let intervals = [
			("pollingInterval", self.polling_interval),
			("requeryInterval", self.requery_interval),
			("heartbeatInterval", self.heartbeat_interval),
			("healthCheckInterval", self.health_check_interval),
			("pingTimeout", self.ping_timeout),
		];
		for (name, value) in intervals {
			if value.is_zero() {
				return Err(ConfigError::validation_error(format!(
					"{} must be greater than 0",
					name
				)));
			}
		}

		if self.reconnect_delay > self.max_reconnect_delay {
			return Err(ConfigError::validation_error(
				"reconnectDelay must not exceed maxReconnectDelay",
			));
		}

		if self.reconnect_attempts == 0 {
			return Err(ConfigError::validation_error(
				"reconnectAttempts must be greater than 0",
			));
		}

		if self.event_buffer == 0 {
			return Err(ConfigError::validation_error(
				"eventBuffer must be greater than 0",
			));
		}

		for (key, limit) in &self.rate_limits {
			if limit.max_requests == 0 || limit.interval.is_zero() {
				return Err(ConfigError::validation_error(format!(
					"Rate limit {} must admit at least one request per non-zero interval",
					key
				)));
			}
		}

		Ok(())
	}
}
