//! Connection status records kept by the connection registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::NetworkId;

/// Heartbeat verdict on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
	Alive,
	/// One probe failed, the next failure declares the connection dead
	Suspect,
	Dead,
}

/// Position in the reconnection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
	Connected,
	Disconnected,
	Reconnecting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
	pub network: NetworkId,
	pub connected: bool,
	pub reconnect_attempts: u32,
	/// Last successful probe or verification
	pub last_ping_time: Option<DateTime<Utc>>,
	pub is_reconnecting: bool,
	/// Set when a reconnection ran out of attempts, only an explicit request or a
	/// recovered endpoint starts another one
	pub reconnect_exhausted: bool,
	pub liveness: Liveness,
	pub consecutive_failures: u32,
	pub active_url: Option<String>,
	pub last_error: Option<String>,
}

impl ConnectionStatus {
	pub fn new(network: NetworkId) -> Self {
		Self {
			network,
			connected: false,
			reconnect_attempts: 0,
			last_ping_time: None,
			is_reconnecting: false,
			reconnect_exhausted: false,
			liveness: Liveness::Dead,
			consecutive_failures: 0,
			active_url: None,
			last_error: None,
		}
	}

	pub fn state(&self) -> ConnectionState {
		if self.is_reconnecting {
			ConnectionState::Reconnecting
		} else if self.connected {
			ConnectionState::Connected
		} else {
			ConnectionState::Disconnected
		}
	}

	/// Records a verified, live handle
	///
	/// Leaves `is_reconnecting` alone, the reconnection that installed the handle clears
	/// it once monitoring is reattached.
	pub fn mark_connected(&mut self, url: &str, now: DateTime<Utc>) {
		self.connected = true;
		self.reconnect_exhausted = false;
		self.reconnect_attempts = 0;
		self.liveness = Liveness::Alive;
		self.consecutive_failures = 0;
		self.last_ping_time = Some(now);
		self.active_url = Some(url.to_string());
		self.last_error = None;
	}

	pub fn mark_disconnected(&mut self, error: Option<String>) {
		self.connected = false;
		self.liveness = Liveness::Dead;
		if error.is_some() {
			self.last_error = error;
		}
	}
}
