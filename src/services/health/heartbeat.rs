//! Heartbeat monitor.
//!
//! One probe loop per monitored network plus a slower global sweep over those same
//! networks. Probes use the native WebSocket ping when the handle offers one and a
//! block number call otherwise. They run through the rate governor in best-effort
//! mode: a saturated endpoint skips the cycle rather than queueing behind real work.

use async_trait::async_trait;
use chrono::Utc;
use std::{
	collections::HashMap,
	sync::{Arc, Mutex, Weak},
	time::{Duration, Instant},
};
use tokio::task::JoinHandle;

use crate::{
	models::{Liveness, NetworkId},
	services::{
		blockchain::{BlockChainError, ChainClient, ConnectionRegistry},
		health::{LivenessPolicy, ReconnectHook, Reconnector},
		ratelimit::{rpc_key, Admission, OnLimit, RateGovernor},
	},
	utils::metrics::MetricsAggregator,
};

/// Result of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
	/// No live handle, a reconnection in flight, or the governor skipped the cycle
	Skipped,
	Healthy(Duration),
	Failed { liveness: Liveness, reconnecting: bool },
}

pub struct HeartbeatMonitor {
	registry: Arc<ConnectionRegistry>,
	governor: Arc<RateGovernor>,
	metrics: Arc<MetricsAggregator>,
	reconnector: Arc<Reconnector>,
	policy: LivenessPolicy,
	health_check_interval: Duration,
	probes: Mutex<HashMap<NetworkId, JoinHandle<()>>>,
	sweep: Mutex<Option<JoinHandle<()>>>,
	this: Weak<Self>,
}

impl HeartbeatMonitor {
	pub fn new(
		registry: Arc<ConnectionRegistry>,
		governor: Arc<RateGovernor>,
		metrics: Arc<MetricsAggregator>,
		reconnector: Arc<Reconnector>,
		policy: LivenessPolicy,
		health_check_interval: Duration,
	) -> Arc<Self> {
		Arc::new_cyclic(|this| Self {
			registry,
			governor,
			metrics,
			reconnector,
			policy,
			health_check_interval,
			probes: Mutex::new(HashMap::new()),
			sweep: Mutex::new(None),
			this: this.clone(),
		})
	}

	pub fn policy(&self) -> &LivenessPolicy {
		&self.policy
	}

	/// Starts the probe loop of a network, no-op when it already runs
	pub fn start(&self, network: NetworkId) {
		let mut probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
		if probes.get(&network).is_some_and(|task| !task.is_finished()) {
			return;
		}
		probes.insert(network, self.spawn_probe_loop(network));
		tracing::debug!(network = %network, "Heartbeat started");
	}

	/// Restarts the probe timer of a network from now
	///
	/// Networks without a running probe loop are left alone.
	///
	/// # Returns
	/// Whether a loop was restarted
	pub fn rearm(&self, network: NetworkId) -> bool {
		let mut probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
		let running = probes.get(&network).is_some_and(|task| !task.is_finished());
		if !running {
			return false;
		}
		if let Some(previous) = probes.insert(network, self.spawn_probe_loop(network)) {
			previous.abort();
		}
		true
	}

	/// Stops the probe loop of a network, and the sweep once no loop is left
	pub fn stop(&self, network: NetworkId) -> bool {
		let (task, idle) = {
			let mut probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
			let task = probes.remove(&network);
			(task, probes.is_empty())
		};
		if idle {
			self.stop_sweep();
		}
		match task {
			Some(task) => {
				task.abort();
				tracing::debug!(network = %network, "Heartbeat stopped");
				true
			}
			None => false,
		}
	}

	/// Networks with a running probe loop, sorted
	pub fn running_networks(&self) -> Vec<NetworkId> {
		let mut networks: Vec<NetworkId> = self
			.probes
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.iter()
			.filter(|(_, task)| !task.is_finished())
			.map(|(network, _)| *network)
			.collect();
		networks.sort();
		networks
	}

	pub fn is_running(&self, network: NetworkId) -> bool {
		self.probes
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(&network)
			.is_some_and(|task| !task.is_finished())
	}

	fn spawn_probe_loop(&self, network: NetworkId) -> JoinHandle<()> {
		let weak = self.this.clone();
		let period = self.policy.heartbeat_interval;
		tokio::spawn(async move {
			let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			loop {
				interval.tick().await;
				let Some(monitor) = weak.upgrade() else {
					return;
				};
				monitor.probe(network).await;
			}
		})
	}

	/// Starts the global staleness sweep, no-op when it already runs
	pub fn start_sweep(&self) {
		let mut sweep = self.sweep.lock().unwrap_or_else(|e| e.into_inner());
		if sweep.as_ref().is_some_and(|task| !task.is_finished()) {
			return;
		}
		let weak = self.this.clone();
		let period = self.health_check_interval;
		*sweep = Some(tokio::spawn(async move {
			let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			loop {
				interval.tick().await;
				let Some(monitor) = weak.upgrade() else {
					return;
				};
				monitor.sweep_once().await;
			}
		}));
	}

	pub fn stop_sweep(&self) -> bool {
		match self.sweep.lock().unwrap_or_else(|e| e.into_inner()).take() {
			Some(task) => {
				task.abort();
				tracing::debug!("Health sweep stopped");
				true
			}
			None => false,
		}
	}

	pub fn is_sweep_running(&self) -> bool {
		self.sweep
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.as_ref()
			.is_some_and(|task| !task.is_finished())
	}

	/// Probes one network and applies the outcome to its status
	///
	/// A network whose reconnection gave up keeps being probed on its retired handle;
	/// the first success starts a fresh reconnection.
	pub async fn probe(&self, network: NetworkId) -> ProbeOutcome {
		let Some(status) = self.registry.status(network).await else {
			return ProbeOutcome::Skipped;
		};
		let exhausted = status.reconnect_exhausted;
		if status.is_reconnecting || (!status.connected && !exhausted) {
			return ProbeOutcome::Skipped;
		}
		let Some(handle) = self.registry.get(network).await else {
			return ProbeOutcome::Skipped;
		};

		match self
			.governor
			.acquire_with(&rpc_key(network), "heartbeat", OnLimit::Skip)
			.await
		{
			Ok(Admission::Granted) => {}
			Ok(Admission::Skipped) => {
				tracing::debug!(network = %network, "Heartbeat skipped, endpoint saturated");
				return ProbeOutcome::Skipped;
			}
			Err(_) => return ProbeOutcome::Skipped,
		}

		let uses_ping = handle.capabilities().ping;
		let result = self.run_probe(handle.as_ref(), uses_ping).await;

		// The handle may have been swapped while the probe was in flight
		match self.registry.get(network).await {
			Some(current) if Arc::ptr_eq(&current, &handle) => {}
			_ => return ProbeOutcome::Skipped,
		}

		match result {
			Ok(latency) if exhausted => {
				tracing::info!(network = %network, "Endpoint answering again");
				self.reconnector
					.trigger_fresh(network, "heartbeat recovered")
					.await;
				ProbeOutcome::Healthy(latency)
			}
			Ok(latency) => {
				self.registry
					.update_status(network, |status| self.policy.record_success(status, Utc::now()))
					.await;
				if uses_ping {
					self.metrics.record_latency(network, "ping", latency);
				}
				tracing::trace!(network = %network, latency_ms = latency.as_millis() as u64, "Heartbeat ok");
				ProbeOutcome::Healthy(latency)
			}
			Err(e) => {
				self.metrics.record_error(network, "heartbeat");
				let error = e.to_string();
				let (liveness, entered_dead) = self
					.registry
					.update_status(network, |status| {
						let entered = self.policy.record_failure(status, Utc::now(), &error);
						(status.liveness, entered)
					})
					.await
					.unwrap_or((Liveness::Dead, false));

				tracing::warn!(network = %network, ?liveness, error = %e, "Heartbeat failed");
				let reconnecting = entered_dead
					&& self.reconnector.trigger(network, "heartbeat failure").await;
				ProbeOutcome::Failed {
					liveness,
					reconnecting,
				}
			}
		}
	}

	async fn run_probe(
		&self,
		handle: &dyn ChainClient,
		uses_ping: bool,
	) -> Result<Duration, BlockChainError> {
		let timeout = self.policy.ping_timeout;
		if uses_ping {
			tokio::time::timeout(timeout, handle.ping()).await?
		} else {
			let started = Instant::now();
			tokio::time::timeout(timeout, handle.get_block_number()).await??;
			Ok(started.elapsed())
		}
	}

	/// Declares dead every monitored connection without a success within the sweep
	/// window. Networks without a running probe loop are not looked at.
	///
	/// # Returns
	/// Networks for which a reconnection was started
	pub async fn sweep_once(&self) -> Vec<NetworkId> {
		let now = Utc::now();
		let mut triggered = Vec::new();
		for network in self.running_networks() {
			let stale = self
				.registry
				.update_status(network, |status| {
					if self.policy.is_stale(status, now) {
						status.liveness = Liveness::Dead;
						true
					} else {
						false
					}
				})
				.await
				.unwrap_or(false);

			if stale {
				tracing::warn!(network = %network, "No heartbeat within the sweep window");
				self.metrics.record_error(network, "stale");
				if self.reconnector.trigger(network, "stale connection").await {
					triggered.push(network);
				}
			}
		}
		triggered
	}

	/// Stops every probe loop and the sweep
	pub fn stop_all(&self) {
		for (_, task) in self
			.probes
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.drain()
		{
			task.abort();
		}
		self.stop_sweep();
	}
}

#[async_trait]
impl ReconnectHook for HeartbeatMonitor {
	async fn on_reconnected(&self, network: NetworkId, _handle: Arc<dyn ChainClient>) {
		if !self.rearm(network) {
			tracing::debug!(network = %network, "Reconnected network has no heartbeat");
		}
	}
}

impl Drop for HeartbeatMonitor {
	fn drop(&mut self) {
		self.stop_all();
	}
}
