//! Blockchain error types and handling.
//!
//! Errors are split in two families. Transport errors (connection failures, closed
//! sockets, timeouts) mean the handle itself is suspect and are routed into the
//! reconnection state machine. Data errors (JSON-RPC error objects, malformed
//! responses, unsupported calls) only invalidate the single check that hit them.

use thiserror::Error;

use crate::services::ratelimit::RateLimitError;

#[derive(Debug, Error)]
pub enum BlockChainError {
	/// The endpoint could not be reached or the connection dropped
	#[error("Connection error: {0}")]
	ConnectionError(String),

	/// The request did not complete in time
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The node answered with a JSON-RPC error object or rejected the request
	#[error("Request error: {0}")]
	RequestError(String),

	/// The node answered with something that could not be decoded
	#[error("Response error: {0}")]
	ResponseError(String),

	/// The client or transport does not offer the operation
	#[error("Unsupported operation: {0}")]
	Unsupported(String),

	/// The rate governor refused the call
	#[error("Rate limited: {0}")]
	RateLimited(#[from] RateLimitError),
}

impl BlockChainError {
	pub fn connection_error(msg: impl Into<String>) -> Self {
		Self::ConnectionError(msg.into())
	}

	pub fn timeout(msg: impl Into<String>) -> Self {
		Self::Timeout(msg.into())
	}

	pub fn request_error(msg: impl Into<String>) -> Self {
		Self::RequestError(msg.into())
	}

	pub fn response_error(msg: impl Into<String>) -> Self {
		Self::ResponseError(msg.into())
	}

	pub fn unsupported(msg: impl Into<String>) -> Self {
		Self::Unsupported(msg.into())
	}

	/// Whether the error indicates a broken connection rather than bad data
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::ConnectionError(_) | Self::Timeout(_))
	}

	/// Short class name used as a metrics label
	pub fn kind(&self) -> &'static str {
		match self {
			Self::ConnectionError(_) => "connection",
			Self::Timeout(_) => "timeout",
			Self::RequestError(_) => "request",
			Self::ResponseError(_) => "response",
			Self::Unsupported(_) => "unsupported",
			Self::RateLimited(_) => "rate_limit",
		}
	}
}

impl From<reqwest_middleware::Error> for BlockChainError {
	fn from(err: reqwest_middleware::Error) -> Self {
		if err.is_timeout() {
			Self::timeout(err.to_string())
		} else {
			Self::connection_error(err.to_string())
		}
	}
}

impl From<tokio_tungstenite::tungstenite::Error> for BlockChainError {
	fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
		Self::connection_error(err.to_string())
	}
}

impl From<tokio::time::error::Elapsed> for BlockChainError {
	fn from(err: tokio::time::error::Elapsed) -> Self {
		Self::timeout(err.to_string())
	}
}
