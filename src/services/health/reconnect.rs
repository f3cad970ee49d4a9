//! Reconnection state machine.
//!
//! `Connected -> Disconnected -> Reconnecting -> {Connected, Disconnected}`. At most
//! one reconnection runs per network; triggers that arrive while one is in flight are
//! coalesced into it. Each attempt waits out the backoff delay, rotates to the next
//! endpoint when the network has several, and builds and verifies a fresh handle
//! before it is swapped into the registry. Running out of attempts leaves the network
//! disconnected, and later triggers are ignored until [`Reconnector::trigger_fresh`].

use async_trait::async_trait;
use std::{
	collections::HashMap,
	sync::{Arc, Mutex, Weak},
};
use tokio::task::JoinHandle;

use crate::{
	models::{MonitorConfig, MonitorEvent, NetworkId},
	services::{
		blockchain::{ChainClient, ConnectionRegistry},
		events::EventBus,
	},
	utils::BackoffPolicy,
};

/// Receives freshly installed handles, used to re-arm timers and subscriptions
#[async_trait]
pub trait ReconnectHook: Send + Sync {
	async fn on_reconnected(&self, network: NetworkId, handle: Arc<dyn ChainClient>);
}

pub struct Reconnector {
	registry: Arc<ConnectionRegistry>,
	events: EventBus,
	backoff: BackoffPolicy,
	hooks: Mutex<Vec<Weak<dyn ReconnectHook>>>,
	tasks: Mutex<HashMap<NetworkId, JoinHandle<()>>>,
}

impl Reconnector {
	pub fn new(registry: Arc<ConnectionRegistry>, events: EventBus, backoff: BackoffPolicy) -> Self {
		Self {
			registry,
			events,
			backoff,
			hooks: Mutex::new(Vec::new()),
			tasks: Mutex::new(HashMap::new()),
		}
	}

	/// Backoff built from `reconnect_delay`, `max_reconnect_delay` and `reconnect_attempts`
	pub fn backoff_from_config(config: &MonitorConfig) -> BackoffPolicy {
		BackoffPolicy::new(
			config.reconnect_attempts,
			config.reconnect_delay,
			config.max_reconnect_delay,
		)
	}

	pub fn backoff(&self) -> &BackoffPolicy {
		&self.backoff
	}

	/// Registers a hook; dropped hooks are pruned on the next notification
	pub fn add_hook(&self, hook: Weak<dyn ReconnectHook>) {
		self.hooks
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(hook);
	}

	/// Starts a reconnection unless one is already running
	///
	/// A network whose last reconnection ran out of attempts is left alone, see
	/// [`Self::trigger_fresh`].
	///
	/// # Returns
	/// * `true` - A new reconnection was started
	/// * `false` - The network is unknown, a reconnection is in flight or the last
	///   one gave up
	pub async fn trigger(self: &Arc<Self>, network: NetworkId, reason: &str) -> bool {
		if !self.registry.is_supported(network) {
			return false;
		}
		if !self.registry.begin_reconnect(network).await {
			tracing::debug!(network = %network, reason, "Reconnection in flight or exhausted");
			return false;
		}

		tracing::warn!(network = %network, reason, "Connection lost, reconnecting");
		let this = self.clone();
		let task = tokio::spawn(async move { this.run(network).await });
		self.tasks
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.insert(network, task);
		true
	}

	/// Starts a reconnection even when the last one ran out of attempts
	pub async fn trigger_fresh(self: &Arc<Self>, network: NetworkId, reason: &str) -> bool {
		if self.registry.clear_exhausted(network).await {
			tracing::info!(network = %network, reason, "Retrying exhausted network");
		}
		self.trigger(network, reason).await
	}

	pub fn is_running(&self, network: NetworkId) -> bool {
		self.tasks
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(&network)
			.map(|task| !task.is_finished())
			.unwrap_or(false)
	}

	async fn run(self: Arc<Self>, network: NetworkId) {
		let Some(endpoints) = self.registry.endpoints(network) else {
			self.registry.end_reconnect(network).await;
			return;
		};

		self.registry
			.update_status(network, |status| {
				status.reconnect_attempts = 0;
				status.connected = false;
			})
			.await;

		let mut attempts = 0u32;
		let mut last_error = String::from("no attempt made");

		while self.backoff.should_retry(attempts) {
			let delay = self.backoff.delay_for(attempts);
			tracing::debug!(network = %network, attempt = attempts + 1, delay_ms = delay.as_millis() as u64, "Scheduling reconnection attempt");
			tokio::time::sleep(delay).await;

			let url = match endpoints.rotate_url().await {
				Some(url) => url,
				None => endpoints.get_active_url().await,
			};

			match self.registry.connect_endpoint(network, &url).await {
				Ok(handle) => {
					endpoints.mark_healthy(&url).await;
					self.complete(network, handle).await;
					return;
				}
				Err(e) => {
					attempts += 1;
					last_error = e.to_string();
					endpoints.mark_failed(&url).await;
					self.events.metrics().record_error(network, "reconnect");
					self.registry
						.update_status(network, |status| {
							status.reconnect_attempts = attempts;
							status.last_error = Some(last_error.clone());
						})
						.await;
					tracing::warn!(network = %network, url = %url, attempt = attempts, error = %e, "Reconnection attempt failed");
				}
			}
		}

		tracing::error!(network = %network, attempts, error = %last_error, "Reconnection attempts exhausted");
		self.registry
			.update_status(network, |status| {
				status.mark_disconnected(Some(last_error.clone()));
				status.is_reconnecting = false;
				status.reconnect_exhausted = true;
			})
			.await;
		self.events.emit(MonitorEvent::ProviderError {
			network,
			error: last_error,
			reconnect_attempts: attempts,
		});
	}

	async fn complete(&self, network: NetworkId, handle: Arc<dyn ChainClient>) {
		let retired = match self.registry.replace(network, handle.clone()).await {
			Ok(retired) => retired,
			Err(e) => {
				tracing::error!(network = %network, error = %e, "Failed to install handle");
				handle.close().await;
				self.registry.end_reconnect(network).await;
				return;
			}
		};
		tracing::info!(network = %network, url = %handle.endpoint(), "Reconnected");

		for hook in self.live_hooks() {
			hook.on_reconnected(network, handle.clone()).await;
		}

		self.events.emit(MonitorEvent::ProviderReconnected { network });
		self.events.metrics().record_reconnection(network);

		if let Some(retired) = retired {
			retired.close().await;
		}
		self.registry.end_reconnect(network).await;
	}

	fn live_hooks(&self) -> Vec<Arc<dyn ReconnectHook>> {
		let mut hooks = self.hooks.lock().unwrap_or_else(|e| e.into_inner());
		hooks.retain(|hook| hook.strong_count() > 0);
		hooks.iter().filter_map(Weak::upgrade).collect()
	}

	/// Aborts every running reconnection
	pub async fn shutdown(&self) {
		let tasks: Vec<(NetworkId, JoinHandle<()>)> = self
			.tasks
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.drain()
			.collect();
		for (network, task) in tasks {
			if !task.is_finished() {
				task.abort();
				self.registry.end_reconnect(network).await;
			}
		}
		self.hooks.lock().unwrap_or_else(|e| e.into_inner()).clear();
	}
}
