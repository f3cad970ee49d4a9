//! Monitoring engine.
//!
//! Tracks balances and NFT transfers per network and publishes changes on a broadcast
//! channel. Each network with at least one registration runs:
//!
//! - `balance_<network>`: polling timer running a balance pass and an NFT pass
//! - `blocks_<network>`: new-block subscription running the same passes per block,
//!   when the client can push blocks
//! - `nft_<network>_<contract>`: requery timer of one watched contract
//!
//! Passes of one network are serialized by a per-network lock. Results are written
//! back only when the entry is still tracked once the I/O completes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
	collections::HashMap,
	future::Future,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, MutexGuard, Weak,
	},
	time::Instant,
};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
	models::{
		AddressOptions, BalanceKind, CollectionOptions, ConnectionStatus, MonitorConfig,
		MonitorEvent, MonitoredAddress, MonitoredCollection, MonitoredNft, NetworkConfig,
		NetworkId, NewBlock, NftOptions, NATIVE_BALANCE_KEY,
	},
	services::{
		blockchain::{
			BlockChainError, ChainClient, ClientFactory, ConnectionRegistry, DefaultClientFactory,
		},
		events::EventBus,
		health::{HeartbeatMonitor, LivenessPolicy, ReconnectHook, Reconnector},
		monitor::{
			nft::{decode_transfer_log, dispatch_transfer},
			state::{
				apply_observation, balance_key, blocks_key, nft_key, BalanceObservation,
				NetworkState, TaskHandle,
			},
			MonitorError,
		},
		ratelimit::{rpc_key, Admission, RateGovernor},
	},
	utils::metrics::{MetricsAggregator, MetricsSnapshot},
};

/// Widest block range queried for transfer logs in one call
pub const MAX_LOG_RANGE: u64 = 2_000;

pub struct MonitoringEngine {
	config: MonitorConfig,
	registry: Arc<ConnectionRegistry>,
	governor: Arc<RateGovernor>,
	metrics: Arc<MetricsAggregator>,
	events: EventBus,
	reconnector: Arc<Reconnector>,
	heartbeat: Arc<HeartbeatMonitor>,
	state: Mutex<HashMap<NetworkId, NetworkState>>,
	tasks: Mutex<HashMap<String, TaskHandle>>,
	check_locks: HashMap<NetworkId, tokio::sync::Mutex<()>>,
	destroyed: AtomicBool,
	this: Weak<Self>,
}

impl MonitoringEngine {
	/// Creates an engine using the built-in EVM and Solana clients
	pub fn new(
		config: MonitorConfig,
		networks: Vec<NetworkConfig>,
	) -> Result<Arc<Self>, MonitorError> {
		Self::new_with_factory(config, networks, Arc::new(DefaultClientFactory::default()))
	}

	/// Creates an engine whose handles come from `factory`
	pub fn new_with_factory(
		config: MonitorConfig,
		networks: Vec<NetworkConfig>,
		factory: Arc<dyn ClientFactory>,
	) -> Result<Arc<Self>, MonitorError> {
		let metrics = Arc::new(
			MetricsAggregator::new().map_err(|e| MonitorError::initialization_error(e.to_string()))?,
		);
		let governor = Arc::new(RateGovernor::new(config.rate_limits.clone()));
		let registry = Arc::new(ConnectionRegistry::new(
			networks,
			factory,
			governor.clone(),
			config.ping_timeout,
		)?);
		let events = EventBus::new(config.event_buffer, metrics.clone());
		let reconnector = Arc::new(Reconnector::new(
			registry.clone(),
			events.clone(),
			Reconnector::backoff_from_config(&config),
		));
		let heartbeat = HeartbeatMonitor::new(
			registry.clone(),
			governor.clone(),
			metrics.clone(),
			reconnector.clone(),
			LivenessPolicy::from_config(&config),
			config.health_check_interval,
		);
		let heartbeat_weak = Arc::downgrade(&heartbeat);
		let heartbeat_hook: Weak<dyn ReconnectHook> = heartbeat_weak;
		reconnector.add_hook(heartbeat_hook);

		let check_locks = NetworkId::ALL
			.into_iter()
			.map(|network| (network, tokio::sync::Mutex::new(())))
			.collect();

		let engine = Arc::new_cyclic(|this| Self {
			config,
			registry,
			governor,
			metrics,
			events,
			reconnector,
			heartbeat,
			state: Mutex::new(HashMap::new()),
			tasks: Mutex::new(HashMap::new()),
			check_locks,
			destroyed: AtomicBool::new(false),
			this: this.clone(),
		});
		let engine_hook: Weak<dyn ReconnectHook> = engine.this.clone();
		engine.reconnector.add_hook(engine_hook);

		tracing::info!(networks = ?engine.registry.networks(), "Monitoring engine created");
		Ok(engine)
	}

	fn state(&self) -> MutexGuard<'_, HashMap<NetworkId, NetworkState>> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn tasks(&self) -> MutexGuard<'_, HashMap<String, TaskHandle>> {
		self.tasks.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn ensure_usable(&self, network: NetworkId) -> Result<(), MonitorError> {
		if self.destroyed.load(Ordering::SeqCst) {
			return Err(MonitorError::Destroyed);
		}
		if !self.registry.is_supported(network) {
			return Err(MonitorError::UnsupportedNetwork(network));
		}
		Ok(())
	}

	fn normalize(network: NetworkId, address: &str) -> Result<String, MonitorError> {
		network
			.normalize_address(address)
			.map_err(MonitorError::invalid_address)
	}

	fn ensure_nft_capable(network: NetworkId) -> Result<(), MonitorError> {
		if !network.is_evm_like() {
			return Err(MonitorError::unsupported(format!(
				"NFT monitoring is not available on {}",
				network
			)));
		}
		Ok(())
	}

	/// Tracks native and token balances of an address
	///
	/// Registering the same address again replaces its options and keeps the balances
	/// that are still tracked.
	pub fn monitor_address(
		&self,
		network: NetworkId,
		address: &str,
		options: AddressOptions,
	) -> Result<(), MonitorError> {
		self.ensure_usable(network)?;
		let address = Self::normalize(network, address)?;

		{
			let mut state = self.state();
			let network_state = state.entry(network).or_default();
			let mut entry = MonitoredAddress::new(network, address.clone(), &options);
			if let Some(previous) = network_state.addresses.remove(&address) {
				let kept = previous
					.last_balances
					.into_iter()
					.filter(|(key, _)| {
						if key == NATIVE_BALANCE_KEY {
							entry.track_balance
						} else {
							entry.tokens.contains(key)
						}
					})
					.collect();
				entry.last_balances = kept;
				entry.last_checked = previous.last_checked;
			}
			network_state.addresses.insert(address.clone(), entry);
		}

		tracing::info!(network = %network, address = %address, "Monitoring address");
		self.ensure_network_tasks(network);
		Ok(())
	}

	/// Stops tracking the balances of an address
	pub fn stop_monitoring(&self, network: NetworkId, address: &str) -> bool {
		let Ok(address) = Self::normalize(network, address) else {
			return false;
		};
		let removed = self
			.state()
			.get_mut(&network)
			.and_then(|state| state.addresses.remove(&address))
			.is_some();
		if removed {
			tracing::info!(network = %network, address = %address, "Stopped monitoring address");
			self.teardown_if_idle(network);
		}
		removed
	}

	/// Tracks NFT transfers of an address on a set of contracts
	pub fn monitor_nft_transfers(
		&self,
		network: NetworkId,
		address: &str,
		options: NftOptions,
	) -> Result<(), MonitorError> {
		self.ensure_usable(network)?;
		Self::ensure_nft_capable(network)?;
		let address = Self::normalize(network, address)?;
		let contracts = options
			.contract_addresses
			.iter()
			.map(|contract| Self::normalize(network, contract))
			.collect::<Result<_, _>>()?;

		{
			let mut state = self.state();
			let network_state = state.entry(network).or_default();
			network_state.nfts.insert(
				address.clone(),
				MonitoredNft {
					network,
					address: address.clone(),
					contract_addresses: contracts,
					standards: options.standards.into_iter().collect(),
					last_checked: None,
				},
			);
		}

		tracing::info!(network = %network, address = %address, "Monitoring NFT transfers");
		self.ensure_network_tasks(network);
		Ok(())
	}

	pub fn stop_monitoring_nfts(&self, network: NetworkId, address: &str) -> bool {
		let Ok(address) = Self::normalize(network, address) else {
			return false;
		};
		let removed = self
			.state()
			.get_mut(&network)
			.and_then(|state| state.nfts.remove(&address))
			.is_some();
		if removed {
			tracing::info!(network = %network, address = %address, "Stopped monitoring NFT transfers");
			self.teardown_if_idle(network);
		}
		removed
	}

	/// Reports every transfer of a contract
	pub fn monitor_nft_collection(
		&self,
		network: NetworkId,
		contract: &str,
		options: CollectionOptions,
	) -> Result<(), MonitorError> {
		self.ensure_usable(network)?;
		Self::ensure_nft_capable(network)?;
		let contract = Self::normalize(network, contract)?;

		self.state().entry(network).or_default().collections.insert(
			contract.clone(),
			MonitoredCollection {
				network,
				contract: contract.clone(),
				standard: options.standard,
			},
		);

		tracing::info!(network = %network, contract = %contract, "Monitoring NFT collection");
		self.ensure_network_tasks(network);
		Ok(())
	}

	pub fn stop_nft_collection(&self, network: NetworkId, contract: &str) -> bool {
		let Ok(contract) = Self::normalize(network, contract) else {
			return false;
		};
		let removed = self
			.state()
			.get_mut(&network)
			.and_then(|state| state.collections.remove(&contract))
			.is_some();
		if removed {
			tracing::info!(network = %network, contract = %contract, "Stopped monitoring NFT collection");
			self.teardown_if_idle(network);
		}
		removed
	}

	/// Drops every registration and stops all timers, subscriptions and heartbeats
	///
	/// Connections stay open and the engine remains usable.
	pub fn stop_all_monitoring(&self) {
		let networks: Vec<NetworkId> = self.state().drain().map(|(network, _)| network).collect();
		let stopped = {
			let mut tasks = self.tasks();
			let count = tasks.len();
			tasks.clear();
			count
		};
		for network in networks {
			self.heartbeat.stop(network);
		}
		self.heartbeat.stop_sweep();
		tracing::info!(tasks = stopped, "Stopped all monitoring");
	}

	/// Keys of the running timers and subscriptions, sorted
	pub fn active_tasks(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.tasks().keys().cloned().collect();
		keys.sort();
		keys
	}

	pub fn monitored_addresses(&self, network: NetworkId) -> Vec<MonitoredAddress> {
		self.state()
			.get(&network)
			.map(|state| state.addresses.values().cloned().collect())
			.unwrap_or_default()
	}

	pub fn monitored_nfts(&self, network: NetworkId) -> Vec<MonitoredNft> {
		self.state()
			.get(&network)
			.map(|state| state.nfts.values().cloned().collect())
			.unwrap_or_default()
	}

	/// Last observed balance of an address (`native` or a token symbol)
	pub fn last_balance(&self, network: NetworkId, address: &str, key: &str) -> Option<String> {
		let address = Self::normalize(network, address).ok()?;
		self.state()
			.get(&network)?
			.addresses
			.get(&address)?
			.last_balances
			.get(key)
			.cloned()
	}

	/// Forces one balance pass and one NFT pass on a network
	///
	/// Transport errors are handed to the reconnection state machine and data errors
	/// are logged; only rate limit errors reach the caller. Nothing is checked while
	/// the network is disconnected after its reconnection gave up.
	pub async fn check_network(&self, network: NetworkId) -> Result<(), MonitorError> {
		self.ensure_usable(network)?;
		self.run_passes(network).await
	}

	/// Starts a reconnection of a network, also after a terminal failure
	pub async fn reconnect(&self, network: NetworkId) -> Result<bool, MonitorError> {
		self.ensure_usable(network)?;
		Ok(self.reconnector.trigger_fresh(network, "requested").await)
	}

	pub async fn connection_status(&self, network: NetworkId) -> Option<ConnectionStatus> {
		self.registry.status(network).await
	}

	pub fn metrics(&self) -> MetricsSnapshot {
		self.metrics.snapshot()
	}

	pub fn reset_metrics(&self) {
		self.metrics.reset();
	}

	pub fn metrics_aggregator(&self) -> Arc<MetricsAggregator> {
		self.metrics.clone()
	}

	/// Governor shared with other outbound callers (explorer, marketplace clients)
	pub fn governor(&self) -> Arc<RateGovernor> {
		self.governor.clone()
	}

	pub fn registry(&self) -> Arc<ConnectionRegistry> {
		self.registry.clone()
	}

	pub fn heartbeat(&self) -> Arc<HeartbeatMonitor> {
		self.heartbeat.clone()
	}

	pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
		self.events.subscribe()
	}

	pub fn is_destroyed(&self) -> bool {
		self.destroyed.load(Ordering::SeqCst)
	}

	/// Tears down timers, subscriptions, heartbeats, reconnections, governor waiters
	/// and connections. Calling it again is a no-op.
	pub async fn destroy(&self) {
		if self.destroyed.swap(true, Ordering::SeqCst) {
			return;
		}
		tracing::info!("Destroying monitoring engine");

		self.tasks().clear();
		self.heartbeat.stop_all();
		self.reconnector.shutdown().await;
		self.governor.destroy();
		self.registry.close_all().await;
		self.state().clear();
	}

	/// Starts the missing timers, listeners and heartbeat of a network
	fn ensure_network_tasks(&self, network: NetworkId) {
		let Some(engine) = self.this.upgrade() else {
			return;
		};
		let contracts = self
			.state()
			.get(&network)
			.map(NetworkState::watched_contracts)
			.unwrap_or_default();

		{
			let mut tasks = self.tasks();
			let mut ensure = |key: String, spawn: &dyn Fn() -> JoinHandle<()>| {
				let running = tasks.get(&key).is_some_and(|task| !task.is_finished());
				if !running {
					tracing::debug!(key = %key, "Starting task");
					tasks.insert(key, TaskHandle::new(spawn()));
				}
			};

			ensure(balance_key(network), &|| {
				tokio::spawn(balance_loop(Arc::downgrade(&engine), network))
			});
			ensure(blocks_key(network), &|| {
				tokio::spawn(block_subscription(Arc::downgrade(&engine), network))
			});
			for contract in contracts {
				ensure(nft_key(network, &contract), &|| {
					tokio::spawn(contract_loop(Arc::downgrade(&engine), network, contract.clone()))
				});
			}
		}

		self.heartbeat.start(network);
		self.heartbeat.start_sweep();
	}

	/// Removes the tasks a network no longer needs
	fn teardown_if_idle(&self, network: NetworkId) {
		let (idle, contracts) = {
			let mut state = self.state();
			match state.get_mut(&network) {
				Some(network_state) => {
					network_state.prune_cursors();
					let idle = network_state.is_idle();
					let contracts = network_state.watched_contracts();
					if idle {
						state.remove(&network);
					}
					(idle, contracts)
				}
				None => (true, Default::default()),
			}
		};

		let prefix = nft_key(network, "");
		let removed: Vec<TaskHandle> = {
			let mut tasks = self.tasks();
			let stale: Vec<String> = tasks
				.keys()
				.filter(|key| {
					if idle {
						**key == balance_key(network)
							|| **key == blocks_key(network)
							|| key.starts_with(&prefix)
					} else {
						key.strip_prefix(&prefix)
							.is_some_and(|contract| !contracts.contains(contract))
					}
				})
				.cloned()
				.collect();
			stale.iter().filter_map(|key| tasks.remove(key)).collect()
		};

		if !removed.is_empty() {
			tracing::debug!(network = %network, tasks = removed.len(), "Stopped tasks");
		}
		if idle {
			self.heartbeat.stop(network);
		}
	}

	/// Re-creates every task of a network against the current handle
	fn restart_network(&self, network: NetworkId) {
		let prefix = nft_key(network, "");
		{
			let mut tasks = self.tasks();
			tasks.retain(|key, _| {
				*key != balance_key(network) && *key != blocks_key(network) && !key.starts_with(&prefix)
			});
		}
		let has_interest = self
			.state()
			.get(&network)
			.is_some_and(|state| !state.is_idle());
		if has_interest && !self.is_destroyed() {
			self.ensure_network_tasks(network);
		}
	}

	/// Acquires a governor slot for an RPC call
	///
	/// # Returns
	/// * `Ok(true)` - The call may proceed
	/// * `Ok(false)` - The resource is saturated and configured to skip
	async fn admit(&self, network: NetworkId, operation: &str) -> Result<bool, BlockChainError> {
		match self.governor.acquire(&rpc_key(network), operation).await? {
			Admission::Granted => Ok(true),
			Admission::Skipped => {
				tracing::debug!(network = %network, operation, "Call skipped by rate governor");
				Ok(false)
			}
		}
	}

	/// Runs one governed, timed RPC call
	async fn call<T, F, Fut>(
		&self,
		network: NetworkId,
		operation: &str,
		call: F,
	) -> Result<Option<T>, BlockChainError>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, BlockChainError>>,
	{
		if !self.admit(network, operation).await? {
			return Ok(None);
		}
		let started = Instant::now();
		let result = call().await;
		self.metrics
			.record_latency(network, operation, started.elapsed());
		result.map(Some)
	}

	async fn client(&self, network: NetworkId) -> Result<Arc<dyn ChainClient>, BlockChainError> {
		self.registry.get_or_connect(network).await
	}

	/// Routes a failed check
	///
	/// Transport errors start a reconnection, rate limit errors are handed back to the
	/// caller, everything else is logged and skipped.
	async fn handle_error(
		&self,
		network: NetworkId,
		operation: &str,
		error: BlockChainError,
	) -> Result<(), MonitorError> {
		self.metrics.record_error(network, error.kind());
		match error {
			BlockChainError::RateLimited(e) => {
				tracing::warn!(network = %network, operation, error = %e, "Rate limited");
				Err(MonitorError::RateLimited(e))
			}
			e if e.is_transport() => {
				tracing::warn!(network = %network, operation, error = %e, "Transport error");
				if !self.is_destroyed() {
					self.reconnector.trigger(network, operation).await;
				}
				Ok(())
			}
			e => {
				tracing::warn!(network = %network, operation, error = %e, "Check skipped");
				Ok(())
			}
		}
	}

	/// Whether the last reconnection of a network gave up
	async fn is_exhausted(&self, network: NetworkId) -> bool {
		self.registry
			.status(network)
			.await
			.is_some_and(|status| status.reconnect_exhausted)
	}

	async fn run_passes(&self, network: NetworkId) -> Result<(), MonitorError> {
		let Some(lock) = self.check_locks.get(&network) else {
			return Ok(());
		};
		let _guard = lock.lock().await;
		if self.is_exhausted(network).await {
			tracing::trace!(network = %network, "Network disconnected, pass skipped");
			return Ok(());
		}

		self.balance_pass(network).await?;
		let contracts = self
			.state()
			.get(&network)
			.map(NetworkState::watched_contracts)
			.unwrap_or_default();
		for contract in contracts {
			self.contract_pass(network, &contract).await?;
		}
		Ok(())
	}

	async fn run_contract(&self, network: NetworkId, contract: &str) -> Result<(), MonitorError> {
		let Some(lock) = self.check_locks.get(&network) else {
			return Ok(());
		};
		let _guard = lock.lock().await;
		if self.is_exhausted(network).await {
			return Ok(());
		}
		self.contract_pass(network, contract).await
	}

	/// Balance pass, the caller holds the network lock
	async fn balance_pass(&self, network: NetworkId) -> Result<(), MonitorError> {
		let entries: Vec<(String, bool, Vec<String>)> = match self.state().get(&network) {
			Some(state) => state
				.addresses
				.values()
				.filter(|entry| entry.has_balance_interest())
				.map(|entry| {
					(
						entry.address.clone(),
						entry.track_balance,
						entry.tokens.iter().cloned().collect(),
					)
				})
				.collect(),
			None => return Ok(()),
		};
		if entries.is_empty() {
			return Ok(());
		}

		let client = match self.client(network).await {
			Ok(client) => client,
			Err(e) => return self.handle_error(network, "connect", e).await,
		};
		let Some(network_config) = self.registry.network_config(network) else {
			return Ok(());
		};

		for (address, track_balance, tokens) in entries {
			if track_balance {
				let result = self
					.call(network, "getBalance", || client.get_native_balance(&address))
					.await;
				match result {
					Ok(Some(balance)) => self.observe(
						network,
						BalanceObservation {
							address: address.clone(),
							key: NATIVE_BALANCE_KEY.to_string(),
							symbol: network.native_symbol().to_string(),
							kind: BalanceKind::Native,
							value: balance.formatted(),
						},
					),
					Ok(None) => {}
					Err(e) => {
						let transport = e.is_transport();
						self.handle_error(network, "getBalance", e).await?;
						if transport {
							return Ok(());
						}
					}
				}
			}

			for symbol in tokens {
				let Some(token) = network_config.token(&symbol) else {
					tracing::warn!(network = %network, symbol = %symbol, "Unknown token, skipping");
					self.metrics.record_error(network, "unknown_token");
					continue;
				};
				let result = self
					.call(network, "getTokenBalance", || {
						client.get_token_balance(&address, token)
					})
					.await;
				match result {
					Ok(Some(balance)) => self.observe(
						network,
						BalanceObservation {
							address: address.clone(),
							key: symbol.clone(),
							symbol: symbol.clone(),
							kind: BalanceKind::Token,
							value: balance.formatted(),
						},
					),
					Ok(None) => {}
					Err(e) => {
						let transport = e.is_transport();
						self.handle_error(network, "getTokenBalance", e).await?;
						if transport {
							return Ok(());
						}
					}
				}
			}
		}
		Ok(())
	}

	fn observe(&self, network: NetworkId, observation: BalanceObservation) {
		let outcome = {
			let mut state = self.state();
			match state.get_mut(&network) {
				Some(network_state) => {
					apply_observation(network_state, network, observation, Utc::now())
				}
				None => Ok(None),
			}
		};
		match outcome {
			Ok(Some(change)) => {
				tracing::info!(
					network = %network,
					address = %change.address,
					symbol = %change.symbol,
					change = %change.change,
					"Balance changed"
				);
				self.events.emit(MonitorEvent::BalanceChange(change));
			}
			Ok(None) => {}
			Err(e) => {
				tracing::warn!(network = %network, error = %e, "Invalid balance");
				self.metrics.record_error(network, "response");
			}
		}
	}

	/// Transfer log pass of one contract, the caller holds the network lock
	async fn contract_pass(&self, network: NetworkId, contract: &str) -> Result<(), MonitorError> {
		let watched = self
			.state()
			.get(&network)
			.is_some_and(|state| state.is_contract_watched(contract));
		if !watched {
			return Ok(());
		}

		let client = match self.client(network).await {
			Ok(client) => client,
			Err(e) => return self.handle_error(network, "connect", e).await,
		};
		if !client.capabilities().contract_logs {
			return Ok(());
		}

		let latest = match self
			.call(network, "getBlockNumber", || client.get_block_number())
			.await
		{
			Ok(Some(latest)) => latest,
			Ok(None) => return Ok(()),
			Err(e) => return self.handle_error(network, "getBlockNumber", e).await,
		};

		let cursor = {
			let mut state = self.state();
			let Some(network_state) = state.get_mut(&network) else {
				return Ok(());
			};
			match network_state.cursors.get(contract) {
				Some(cursor) => *cursor,
				None => {
					// First observation starts from the next block
					network_state
						.cursors
						.insert(contract.to_string(), latest.saturating_add(1));
					return Ok(());
				}
			}
		};
		if cursor > latest {
			return Ok(());
		}
		let to_block = latest.min(cursor.saturating_add(MAX_LOG_RANGE - 1));

		let logs = match self
			.call(network, "getLogs", || {
				client.get_transfer_logs(contract, cursor, to_block)
			})
			.await
		{
			Ok(Some(logs)) => logs,
			Ok(None) => return Ok(()),
			Err(e) => return self.handle_error(network, "getLogs", e).await,
		};

		let mut transfers = Vec::new();
		for log in &logs {
			match decode_transfer_log(network, log) {
				Ok(decoded) => transfers.extend(decoded),
				Err(e) => {
					tracing::warn!(network = %network, contract, error = %e, "Undecodable transfer log");
					self.metrics.record_error(network, "decode");
				}
			}
		}

		let events = {
			let mut state = self.state();
			let Some(network_state) = state.get_mut(&network) else {
				return Ok(());
			};
			if !network_state.is_contract_watched(contract) {
				return Ok(());
			}
			network_state
				.cursors
				.insert(contract.to_string(), to_block.saturating_add(1));

			let now = Utc::now();
			let collection_watched = network_state.collections.contains_key(contract);
			let mut events = Vec::new();
			for transfer in &transfers {
				events.extend(dispatch_transfer(
					transfer,
					network_state.nfts.values(),
					collection_watched,
				));
			}
			for entry in network_state.nfts.values_mut() {
				if entry.contract_addresses.contains(contract) {
					entry.last_checked = Some(now);
				}
			}
			events
		};

		for event in events {
			self.events.emit(event);
		}
		Ok(())
	}

	async fn on_block(&self, network: NetworkId, number: u64, timestamp: Option<u64>) {
		let timestamp = timestamp
			.and_then(|seconds| i64::try_from(seconds).ok())
			.and_then(|seconds| DateTime::from_timestamp(seconds, 0))
			.unwrap_or_else(Utc::now);
		self.events.emit(MonitorEvent::NewBlock(NewBlock {
			network,
			block_number: number,
			timestamp,
		}));
		if let Err(e) = self.run_passes(network).await {
			tracing::debug!(network = %network, error = %e, "Block pass failed");
		}
	}
}

async fn balance_loop(engine: Weak<MonitoringEngine>, network: NetworkId) {
	let Some(period) = engine.upgrade().map(|engine| engine.config.polling_interval) else {
		return;
	};
	let mut interval = tokio::time::interval(period);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	loop {
		interval.tick().await;
		let Some(engine) = engine.upgrade() else {
			return;
		};
		if let Err(e) = engine.run_passes(network).await {
			tracing::debug!(network = %network, error = %e, "Polling pass failed");
		}
	}
}

async fn contract_loop(engine: Weak<MonitoringEngine>, network: NetworkId, contract: String) {
	let Some(period) = engine.upgrade().map(|engine| engine.config.requery_interval) else {
		return;
	};
	let mut interval = tokio::time::interval(period);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
	loop {
		interval.tick().await;
		let Some(engine) = engine.upgrade() else {
			return;
		};
		if let Err(e) = engine.run_contract(network, &contract).await {
			tracing::debug!(network = %network, contract = %contract, error = %e, "Contract pass failed");
		}
	}
}

async fn block_subscription(engine: Weak<MonitoringEngine>, network: NetworkId) {
	let mut blocks = {
		let Some(engine) = engine.upgrade() else {
			return;
		};
		let client = match engine.client(network).await {
			Ok(client) => client,
			Err(e) => {
				let _ = engine.handle_error(network, "connect", e).await;
				return;
			}
		};
		if !client.capabilities().block_subscription {
			tracing::debug!(network = %network, "No block subscription, polling only");
			return;
		}
		match engine
			.call(network, "subscribeBlocks", || client.subscribe_blocks())
			.await
		{
			Ok(Some(blocks)) => blocks,
			Ok(None) => return,
			Err(e) => {
				let _ = engine.handle_error(network, "subscribeBlocks", e).await;
				return;
			}
		}
	};
	tracing::debug!(network = %network, "Subscribed to new blocks");

	while let Some(header) = blocks.recv().await {
		let Some(engine) = engine.upgrade() else {
			return;
		};
		engine.on_block(network, header.number, header.timestamp).await;
	}

	if let Some(engine) = engine.upgrade() {
		if !engine.is_destroyed() {
			let _ = engine
				.handle_error(
					network,
					"subscribeBlocks",
					BlockChainError::connection_error("block subscription closed"),
				)
				.await;
		}
	}
}

#[async_trait]
impl ReconnectHook for MonitoringEngine {
	async fn on_reconnected(&self, network: NetworkId, _handle: Arc<dyn ChainClient>) {
		tracing::info!(network = %network, "Reattaching monitoring to new connection");
		self.restart_network(network);
	}
}

impl Drop for MonitoringEngine {
	fn drop(&mut self) {
		self.tasks.get_mut().unwrap_or_else(|e| e.into_inner()).clear();
		self.heartbeat.stop_all();
		self.governor.destroy();
	}
}
