//! HTTP transport implementation for blockchain interactions.
//!
//! Sends JSON-RPC requests over a pooled `reqwest` client wrapped in retry middleware,
//! so transient failures (connect errors, 5xx, 429) are retried before they surface
//! as transport errors.

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde_json::Value;
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};
use url::Url;

use crate::{
	services::blockchain::{transports::BlockchainTransport, BlockChainError},
	utils::{create_retryable_http_client, HttpRetryConfig, TransientErrorRetryStrategy},
};

/// JSON-RPC over HTTP for a single endpoint
#[derive(Debug)]
pub struct HttpTransportClient {
	client: ClientWithMiddleware,
	url: Url,
	request_id_counter: AtomicU64,
}

impl HttpTransportClient {
	/// Creates a transport for `url`
	///
	/// No request is sent here. The connection registry verifies every new handle with
	/// a cheap read before installing it.
	///
	/// # Arguments
	/// * `url` - HTTP(S) endpoint URL
	/// * `retry_config` - Retry policy for transient failures
	/// * `request_timeout` - Overall timeout of a single HTTP exchange
	pub fn new(
		url: &str,
		retry_config: &HttpRetryConfig,
		request_timeout: Duration,
	) -> Result<Self, BlockChainError> {
		let url = Url::parse(url)
			.map_err(|e| BlockChainError::connection_error(format!("Invalid URL {}: {}", url, e)))?;
		if !matches!(url.scheme(), "http" | "https") {
			return Err(BlockChainError::connection_error(format!(
				"Unsupported scheme for HTTP transport: {}",
				url
			)));
		}

		let http_client = reqwest::ClientBuilder::new()
			.pool_idle_timeout(Duration::from_secs(90))
			.pool_max_idle_per_host(32)
			.timeout(request_timeout)
			.connect_timeout(request_timeout.min(Duration::from_secs(20)))
			.build()
			.map_err(|e| {
				BlockChainError::connection_error(format!("Failed to create HTTP client: {}", e))
			})?;

		let client = create_retryable_http_client(
			retry_config,
			http_client,
			Some(TransientErrorRetryStrategy),
		);

		Ok(Self {
			client,
			url,
			request_id_counter: AtomicU64::new(1),
		})
	}
}

#[async_trait]
impl BlockchainTransport for HttpTransportClient {
	fn get_current_url(&self) -> &str {
		self.url.as_str()
	}

	async fn send_raw_request<P>(
		&self,
		method: &str,
		params: Option<P>,
	) -> Result<Value, BlockChainError>
	where
		P: Into<Value> + Send + Clone + Serialize,
	{
		let id = self.request_id_counter.fetch_add(1, Ordering::Relaxed);
		let body = self.customize_request(id, method, params);

		let response = self.client.post(self.url.clone()).json(&body).send().await?;

		let status = response.status();
		if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
			return Err(BlockChainError::connection_error(format!(
				"{} answered {} to {}",
				self.url, status, method
			)));
		}
		if !status.is_success() {
			return Err(BlockChainError::request_error(format!(
				"{} answered {} to {}",
				self.url, status, method
			)));
		}

		response.json::<Value>().await.map_err(|e| {
			BlockChainError::response_error(format!("Invalid JSON from {}: {}", self.url, e))
		})
	}
}
