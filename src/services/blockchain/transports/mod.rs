//! Network transport implementations for blockchain clients.
//!
//! A transport speaks JSON-RPC 2.0 to exactly one endpoint:
//! - HTTP transport with retrying middleware
//! - WebSocket transport with request correlation, native ping and push subscriptions
//!
//! Failover between endpoints is not a transport concern. The connection registry
//! rotates endpoints and builds a fresh transport for each attempt.

mod http;
mod ws;

pub use http::HttpTransportClient;
pub use ws::{WsConfig, WsTransportClient};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::services::blockchain::BlockChainError;

/// Base trait for all blockchain transport clients
#[async_trait]
pub trait BlockchainTransport: Send + Sync {
	/// URL of the endpoint this transport talks to
	fn get_current_url(&self) -> &str;

	/// Sends a JSON-RPC request and returns the full response object
	async fn send_raw_request<P>(
		&self,
		method: &str,
		params: Option<P>,
	) -> Result<Value, BlockChainError>
	where
		P: Into<Value> + Send + Clone + Serialize;

	/// Builds the JSON-RPC request body
	fn customize_request<P>(&self, id: u64, method: &str, params: Option<P>) -> Value
	where
		P: Into<Value> + Send + Clone + Serialize,
	{
		json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params.map(|p| p.into()).unwrap_or_else(|| json!([]))
		})
	}

	/// Whether [`BlockchainTransport::ping`] is backed by a protocol-level ping
	fn supports_ping(&self) -> bool {
		false
	}

	/// Whether [`BlockchainTransport::subscribe`] can open push subscriptions
	fn supports_subscriptions(&self) -> bool {
		false
	}

	/// Sends a protocol-level ping and returns the round-trip time
	async fn ping(&self) -> Result<Duration, BlockChainError> {
		Err(BlockChainError::unsupported("transport ping"))
	}

	/// Opens a push subscription
	///
	/// The receiver yields the `result` field of every notification and ends when the
	/// connection is lost.
	async fn subscribe(
		&self,
		_method: &str,
		_params: Value,
	) -> Result<mpsc::Receiver<Value>, BlockChainError> {
		Err(BlockChainError::unsupported("push subscriptions"))
	}

	/// Releases the underlying connection
	async fn close(&self) {}
}

/// Extracts the `result` of a JSON-RPC response
///
/// An `error` object becomes a [`BlockChainError::RequestError`], a response with
/// neither field a [`BlockChainError::ResponseError`].
pub fn extract_result(response: Value) -> Result<Value, BlockChainError> {
	if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
		let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
		let message = error
			.get("message")
			.and_then(Value::as_str)
			.unwrap_or("unknown error");
		return Err(BlockChainError::request_error(format!(
			"{} (code {})",
			message, code
		)));
	}

	match response {
		Value::Object(mut map) => map
			.remove("result")
			.ok_or_else(|| BlockChainError::response_error("Response without result")),
		other => Err(BlockChainError::response_error(format!(
			"Unexpected response shape: {}",
			other
		))),
	}
}
