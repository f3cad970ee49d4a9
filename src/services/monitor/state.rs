//! Tracking sets and task handles of the monitoring engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use tokio::task::JoinHandle;

use crate::{
	models::{
		BalanceChange, BalanceKind, MonitoredAddress, MonitoredCollection, MonitoredNft, NetworkId,
	},
	utils::parsing::balance_delta,
};

pub fn balance_key(network: NetworkId) -> String {
	format!("balance_{}", network)
}

pub fn blocks_key(network: NetworkId) -> String {
	format!("blocks_{}", network)
}

pub fn nft_key(network: NetworkId, contract: &str) -> String {
	format!("nft_{}_{}", network, contract)
}

/// Spawned timer or subscription, aborted when dropped
pub struct TaskHandle {
	task: JoinHandle<()>,
}

impl TaskHandle {
	pub fn new(task: JoinHandle<()>) -> Self {
		Self { task }
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}

impl Drop for TaskHandle {
	fn drop(&mut self) {
		self.task.abort();
	}
}

/// Everything registered on one network
#[derive(Debug, Default)]
pub struct NetworkState {
	pub addresses: HashMap<String, MonitoredAddress>,
	pub nfts: HashMap<String, MonitoredNft>,
	pub collections: HashMap<String, MonitoredCollection>,
	/// Next block to query per watched contract
	pub cursors: HashMap<String, u64>,
}

impl NetworkState {
	pub fn is_idle(&self) -> bool {
		self.addresses.is_empty() && self.nfts.is_empty() && self.collections.is_empty()
	}

	/// Contracts referenced by an NFT entry or a collection
	pub fn watched_contracts(&self) -> BTreeSet<String> {
		self.nfts
			.values()
			.flat_map(|entry| entry.contract_addresses.iter().cloned())
			.chain(self.collections.keys().cloned())
			.collect()
	}

	pub fn is_contract_watched(&self, contract: &str) -> bool {
		self.collections.contains_key(contract)
			|| self
				.nfts
				.values()
				.any(|entry| entry.contract_addresses.contains(contract))
	}

	/// Drops cursors of contracts nobody watches any more
	pub fn prune_cursors(&mut self) {
		let watched = self.watched_contracts();
		self.cursors.retain(|contract, _| watched.contains(contract));
	}
}

/// One balance read to compare against the last known value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceObservation {
	pub address: String,
	/// `native` or the token symbol
	pub key: String,
	pub symbol: String,
	pub kind: BalanceKind,
	pub value: String,
}

/// Compares an observation with the stored balance and records it
///
/// # Returns
/// * `Ok(Some(change))` - The balance differs from the stored one
/// * `Ok(None)` - First observation, unchanged balance, or the entry is no longer
///   tracked (a removal raced with the read)
/// * `Err(_)` - The stored or observed value is not a decimal
pub fn apply_observation(
	state: &mut NetworkState,
	network: NetworkId,
	observation: BalanceObservation,
	now: DateTime<Utc>,
) -> Result<Option<BalanceChange>, String> {
	let Some(entry) = state.addresses.get_mut(&observation.address) else {
		return Ok(None);
	};
	let still_tracked = match observation.kind {
		BalanceKind::Native => entry.track_balance,
		BalanceKind::Token => entry.tokens.contains(&observation.key),
	};
	if !still_tracked {
		return Ok(None);
	}

	entry.last_checked = Some(now);
	let previous = entry
		.last_balances
		.insert(observation.key.clone(), observation.value.clone());

	let Some(previous) = previous else {
		return Ok(None);
	};
	if previous == observation.value {
		return Ok(None);
	}

	let change: Decimal = balance_delta(&previous, &observation.value)?;
	Ok(Some(BalanceChange {
		kind: observation.kind,
		network,
		address: observation.address,
		symbol: observation.symbol,
		previous_balance: previous,
		new_balance: observation.value,
		change,
		timestamp: now,
	}))
}
