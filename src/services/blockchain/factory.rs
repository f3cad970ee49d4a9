//! Blockchain client factory implementation.
//!
//! Builds a [`ChainClient`] for one endpoint of a network, choosing the client by
//! chain kind and the transport by URL scheme.

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

use crate::{
	models::{ChainKind, NetworkConfig},
	services::blockchain::{
		clients::{EvmClient, SolanaClient},
		transports::{HttpTransportClient, WsConfig, WsTransportClient},
		BlockChainError, ChainClient,
	},
	utils::HttpRetryConfig,
};

/// Creates client handles, the seam used to substitute clients in tests
#[async_trait]
pub trait ClientFactory: Send + Sync {
	/// Builds an unverified handle for `url`
	async fn connect(
		&self,
		network: &NetworkConfig,
		url: &str,
	) -> Result<Arc<dyn ChainClient>, BlockChainError>;
}

/// Factory for the built-in EVM and Solana clients
#[derive(Clone, Debug)]
pub struct DefaultClientFactory {
	http_retry: HttpRetryConfig,
	http_timeout: Duration,
	ws_config: WsConfig,
}

impl Default for DefaultClientFactory {
	fn default() -> Self {
		Self {
			http_retry: HttpRetryConfig::default(),
			http_timeout: Duration::from_secs(30),
			ws_config: WsConfig::default(),
		}
	}
}

impl DefaultClientFactory {
	pub fn new(http_retry: HttpRetryConfig, http_timeout: Duration, ws_config: WsConfig) -> Self {
		Self {
			http_retry,
			http_timeout,
			ws_config,
		}
	}
}

fn is_websocket(url: &str) -> bool {
	url.starts_with("ws://") || url.starts_with("wss://")
}

#[async_trait]
impl ClientFactory for DefaultClientFactory {
	async fn connect(
		&self,
		network: &NetworkConfig,
		url: &str,
	) -> Result<Arc<dyn ChainClient>, BlockChainError> {
		tracing::debug!(network = %network.network, url, "Creating client");

		let client: Arc<dyn ChainClient> = match (network.network.kind(), is_websocket(url)) {
			(ChainKind::Evm, true) => {
				let transport = WsTransportClient::new(url, self.ws_config.clone()).await?;
				Arc::new(EvmClient::new_with_transport(network.network, transport))
			}
			(ChainKind::Evm, false) => {
				let transport = HttpTransportClient::new(url, &self.http_retry, self.http_timeout)?;
				Arc::new(EvmClient::new_with_transport(network.network, transport))
			}
			(ChainKind::Solana, true) => {
				let transport = WsTransportClient::new(url, self.ws_config.clone()).await?;
				Arc::new(SolanaClient::new_with_transport(transport))
			}
			(ChainKind::Solana, false) => {
				let transport = HttpTransportClient::new(url, &self.http_retry, self.http_timeout)?;
				Arc::new(SolanaClient::new_with_transport(transport))
			}
		};

		Ok(client)
	}
}
