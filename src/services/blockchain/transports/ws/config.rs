//! WebSocket configuration for blockchain transports

use std::time::Duration;

/// WebSocket configuration for blockchain transports
#[derive(Clone, Debug, PartialEq)]
pub struct WsConfig {
	/// How long to wait for the handshake
	pub connection_timeout: Duration,
	/// How long to wait for the response to a request
	pub message_timeout: Duration,
	/// Notifications buffered per subscription before the reader applies backpressure
	pub subscription_buffer: usize,
}

impl Default for WsConfig {
	fn default() -> Self {
		Self {
			connection_timeout: Duration::from_secs(10),
			message_timeout: Duration::from_secs(30),
			subscription_buffer: 64,
		}
	}
}

impl WsConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Short timeouts, mostly for tests
	pub fn single_attempt() -> Self {
		Self {
			connection_timeout: Duration::from_secs(1),
			message_timeout: Duration::from_secs(1),
			subscription_buffer: 16,
		}
	}

	pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
		self.connection_timeout = connection_timeout;
		self
	}

	pub fn with_message_timeout(mut self, message_timeout: Duration) -> Self {
		self.message_timeout = message_timeout;
		self
	}

	pub fn with_subscription_buffer(mut self, subscription_buffer: usize) -> Self {
		self.subscription_buffer = subscription_buffer.max(1);
		self
	}
}
