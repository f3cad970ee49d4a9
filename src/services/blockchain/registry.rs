//! Connection registry for managing one client handle per network.
//!
//! The registry:
//! - Keeps exactly one logical connection per configured network
//! - Connects lazily on first use, trying endpoints in weight order
//! - Verifies every new handle with a block number call before installing it
//! - Swaps handles atomically on reconnection and hands the old one back
//! - Tracks the connection status record read by the heartbeat and callers
//!
//! Readers clone the `Arc` handle per call. Only the reconnection state machine
//! replaces a handle.

use chrono::Utc;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};

use crate::{
	models::{ConnectionStatus, NetworkConfig, NetworkId},
	services::{
		blockchain::{BlockChainError, ChainClient, ClientFactory, EndpointManager},
		ratelimit::{rpc_key, OnLimit, RateGovernor},
	},
};

struct NetworkSlot {
	config: NetworkConfig,
	endpoints: EndpointManager,
	handle: RwLock<Option<Arc<dyn ChainClient>>>,
	status: RwLock<ConnectionStatus>,
	/// Serializes lazy connection so concurrent first users share one handle
	connect_lock: Mutex<()>,
}

pub struct ConnectionRegistry {
	slots: HashMap<NetworkId, Arc<NetworkSlot>>,
	factory: Arc<dyn ClientFactory>,
	governor: Arc<RateGovernor>,
	verify_timeout: Duration,
}

impl ConnectionRegistry {
	/// Creates a registry for the given networks
	///
	/// # Errors
	/// Returns an error when a network has no usable endpoint.
	pub fn new(
		networks: impl IntoIterator<Item = NetworkConfig>,
		factory: Arc<dyn ClientFactory>,
		governor: Arc<RateGovernor>,
		verify_timeout: Duration,
	) -> Result<Self, BlockChainError> {
		let mut slots = HashMap::new();
		for config in networks {
			let endpoints = EndpointManager::new(config.endpoint_urls()).map_err(|e| {
				BlockChainError::connection_error(format!("{}: {}", config.network, e))
			})?;
			let network = config.network;
			slots.insert(
				network,
				Arc::new(NetworkSlot {
					config,
					endpoints,
					handle: RwLock::new(None),
					status: RwLock::new(ConnectionStatus::new(network)),
					connect_lock: Mutex::new(()),
				}),
			);
		}

		Ok(Self {
			slots,
			factory,
			governor,
			verify_timeout,
		})
	}

	fn slot(&self, network: NetworkId) -> Result<&Arc<NetworkSlot>, BlockChainError> {
		self.slots.get(&network).ok_or_else(|| {
			BlockChainError::unsupported(format!("Network {} is not configured", network))
		})
	}

	pub fn is_supported(&self, network: NetworkId) -> bool {
		self.slots.contains_key(&network)
	}

	pub fn networks(&self) -> Vec<NetworkId> {
		let mut networks: Vec<NetworkId> = self.slots.keys().copied().collect();
		networks.sort();
		networks
	}

	pub fn network_config(&self, network: NetworkId) -> Option<&NetworkConfig> {
		self.slots.get(&network).map(|slot| &slot.config)
	}

	pub fn endpoints(&self, network: NetworkId) -> Option<&EndpointManager> {
		self.slots.get(&network).map(|slot| &slot.endpoints)
	}

	pub fn verify_timeout(&self) -> Duration {
		self.verify_timeout
	}

	/// Current handle of a network, without connecting
	pub async fn get(&self, network: NetworkId) -> Option<Arc<dyn ChainClient>> {
		let slot = self.slots.get(&network)?;
		slot.handle.read().await.clone()
	}

	/// Current handle of a network, connecting on first use
	///
	/// Endpoints are tried in rotation order; the first one that passes verification
	/// becomes active. A network that is being reconnected is not connected here, the
	/// caller gets a connection error and retries on its next cycle.
	pub async fn get_or_connect(
		&self,
		network: NetworkId,
	) -> Result<Arc<dyn ChainClient>, BlockChainError> {
		let slot = self.slot(network)?;

		// Fast path: handle exists
		if let Some(handle) = slot.handle.read().await.clone() {
			return Ok(handle);
		}

		// Slow path: connect under the per-network lock
		let _guard = slot.connect_lock.lock().await;
		if let Some(handle) = slot.handle.read().await.clone() {
			return Ok(handle);
		}
		if slot.status.read().await.is_reconnecting {
			return Err(BlockChainError::connection_error(format!(
				"{} is reconnecting",
				network
			)));
		}

		let mut last_error = None;
		for url in slot.endpoints.all_urls().await {
			match self.connect_endpoint(network, &url).await {
				Ok(handle) => {
					slot.endpoints.set_active(&url).await;
					slot.endpoints.mark_healthy(&url).await;
					self.install(network, handle.clone()).await?;
					tracing::info!(network = %network, url = %url, "Connected");
					return Ok(handle);
				}
				Err(e) => {
					tracing::warn!(network = %network, url = %url, error = %e, "Endpoint failed verification");
					slot.endpoints.mark_failed(&url).await;
					last_error = Some(e);
				}
			}
		}

		let error = last_error.unwrap_or_else(|| {
			BlockChainError::connection_error(format!("No endpoint for {}", network))
		});
		slot.status
			.write()
			.await
			.mark_disconnected(Some(error.to_string()));
		Err(error)
	}

	/// Builds a handle for `url` and verifies it before returning it
	///
	/// The handle is closed again when verification fails.
	pub async fn connect_endpoint(
		&self,
		network: NetworkId,
		url: &str,
	) -> Result<Arc<dyn ChainClient>, BlockChainError> {
		let slot = self.slot(network)?;
		let handle = tokio::time::timeout(self.verify_timeout, self.factory.connect(&slot.config, url))
			.await??;

		match self.verify(network, handle.as_ref()).await {
			Ok(block) => {
				tracing::debug!(network = %network, url, block, "Verified endpoint");
				Ok(handle)
			}
			Err(e) => {
				handle.close().await;
				Err(e)
			}
		}
	}

	/// Block number call bounded by the verification timeout
	pub async fn verify(
		&self,
		network: NetworkId,
		handle: &dyn ChainClient,
	) -> Result<u64, BlockChainError> {
		self.governor
			.acquire_with(&rpc_key(network), "verify", OnLimit::Error)
			.await?;
		tokio::time::timeout(self.verify_timeout, handle.get_block_number()).await?
	}

	/// Installs the first handle of a network
	///
	/// # Errors
	/// Returns an error when the network already has a handle, use [`Self::replace`].
	pub async fn install(
		&self,
		network: NetworkId,
		handle: Arc<dyn ChainClient>,
	) -> Result<(), BlockChainError> {
		let slot = self.slot(network)?;
		let url = handle.endpoint();
		{
			let mut current = slot.handle.write().await;
			if current.is_some() {
				return Err(BlockChainError::connection_error(format!(
					"{} already has a handle",
					network
				)));
			}
			*current = Some(handle);
		}
		slot.status.write().await.mark_connected(&url, Utc::now());
		Ok(())
	}

	/// Swaps in a verified handle and returns the retired one
	///
	/// The swap happens under the write lock; the caller closes the returned handle
	/// once it is out of the registry.
	pub async fn replace(
		&self,
		network: NetworkId,
		handle: Arc<dyn ChainClient>,
	) -> Result<Option<Arc<dyn ChainClient>>, BlockChainError> {
		let slot = self.slot(network)?;
		let url = handle.endpoint();
		let previous = slot.handle.write().await.replace(handle);
		slot.status.write().await.mark_connected(&url, Utc::now());
		Ok(previous)
	}

	/// Status record of a network
	pub async fn status(&self, network: NetworkId) -> Option<ConnectionStatus> {
		let slot = self.slots.get(&network)?;
		Some(slot.status.read().await.clone())
	}

	/// Status records of every configured network, by network order
	pub async fn statuses(&self) -> Vec<ConnectionStatus> {
		let mut statuses = Vec::with_capacity(self.slots.len());
		for network in self.networks() {
			if let Some(status) = self.status(network).await {
				statuses.push(status);
			}
		}
		statuses
	}

	/// Mutates the status record of a network under its lock
	pub async fn update_status<R>(
		&self,
		network: NetworkId,
		update: impl FnOnce(&mut ConnectionStatus) -> R,
	) -> Option<R> {
		let slot = self.slots.get(&network)?;
		let mut status = slot.status.write().await;
		Some(update(&mut status))
	}

	/// Claims the reconnection of a network
	///
	/// # Returns
	/// * `true` - The caller owns the reconnection and must call [`Self::end_reconnect`]
	/// * `false` - A reconnection is already in flight, or the last one ran out of
	///   attempts and [`Self::clear_exhausted`] was not called since
	pub async fn begin_reconnect(&self, network: NetworkId) -> bool {
		self.update_status(network, |status| {
			if status.is_reconnecting || status.reconnect_exhausted {
				return false;
			}
			status.is_reconnecting = true;
			status.connected = false;
			true
		})
		.await
		.unwrap_or(false)
	}

	pub async fn end_reconnect(&self, network: NetworkId) {
		self.update_status(network, |status| status.is_reconnecting = false)
			.await;
	}

	/// Allows reconnection of a network whose last reconnection gave up
	///
	/// # Returns
	/// Whether the network was marked exhausted
	pub async fn clear_exhausted(&self, network: NetworkId) -> bool {
		self.update_status(network, |status| {
			std::mem::replace(&mut status.reconnect_exhausted, false)
		})
		.await
		.unwrap_or(false)
	}

	/// Closes and removes every handle
	pub async fn close_all(&self) {
		for (network, slot) in &self.slots {
			let handle = slot.handle.write().await.take();
			{
				let mut status = slot.status.write().await;
				status.mark_disconnected(None);
				status.is_reconnecting = false;
			}
			if let Some(handle) = handle {
				handle.close().await;
				tracing::debug!(network = %network, "Closed connection");
			}
		}
	}
}
