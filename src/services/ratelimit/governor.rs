//! Request-rate governor keyed by resource.
//!
//! Each resource key owns a GCRA limiter from the `governor` crate admitting
//! `max_requests` per `interval`, with the full burst available up front. Callers that
//! find it saturated wait in a bounded queue: a fair semaphore with `max_queue`
//! permits keeps them in arrival order, and only the caller at the head of the queue
//! waits on the limiter.

use std::{
	collections::HashMap,
	num::NonZeroU32,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex, MutexGuard,
	},
};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::{watch, Semaphore, TryAcquireError};

use crate::{
	models::{NetworkId, ResourceLimit},
	services::ratelimit::RateLimitError,
};

/// Outcome of a successful acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
	/// A slot was consumed, the caller may proceed
	Granted,
	/// The resource is saturated and the caller should skip this cycle
	Skipped,
}

/// Behavior on queue overflow or wait timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnLimit {
	Error,
	Skip,
}

pub fn rpc_key(network: NetworkId) -> String {
	format!("rpc:{}", network)
}

pub fn explorer_key(name: &str) -> String {
	format!("explorer:{}", name)
}

pub fn marketplace_key(name: &str) -> String {
	format!("marketplace:{}", name)
}

struct Bucket {
	limit: ResourceLimit,
	pacer: DefaultDirectRateLimiter,
	/// One permit per waiting caller
	queue: Semaphore,
	/// Held by the waiter at the head of the queue
	head: Semaphore,
}

impl Bucket {
	fn new(limit: ResourceLimit) -> Self {
		let burst = NonZeroU32::new(limit.max_requests).unwrap_or(NonZeroU32::MIN);
		let quota = Quota::with_period(limit.interval / burst.get())
			.unwrap_or_else(|| Quota::per_second(burst))
			.allow_burst(burst);
		Self {
			pacer: RateLimiter::direct(quota),
			queue: Semaphore::new(limit.max_queue),
			head: Semaphore::new(1),
			limit,
		}
	}

	fn queued(&self) -> usize {
		self.limit
			.max_queue
			.saturating_sub(self.queue.available_permits())
	}

	fn close(&self) {
		self.queue.close();
		self.head.close();
	}
}

/// Request-rate governor shared by every outbound caller
pub struct RateGovernor {
	overrides: HashMap<String, ResourceLimit>,
	buckets: Mutex<HashMap<String, Arc<Bucket>>>,
	destroyed: AtomicBool,
	shutdown: watch::Sender<bool>,
}

impl RateGovernor {
	/// Creates a governor with per-key overrides of the class defaults
	pub fn new(overrides: HashMap<String, ResourceLimit>) -> Self {
		Self {
			overrides,
			buckets: Mutex::new(HashMap::new()),
			destroyed: AtomicBool::new(false),
			shutdown: watch::Sender::new(false),
		}
	}

	fn buckets(&self) -> MutexGuard<'_, HashMap<String, Arc<Bucket>>> {
		self.buckets.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Limit applied to a resource key
	///
	/// Exact overrides win; otherwise the key's class (`rpc:solana`, `rpc:*`,
	/// `explorer:*`, `marketplace:*`) picks the default.
	pub fn limit_for(&self, key: &str) -> ResourceLimit {
		if let Some(limit) = self.overrides.get(key) {
			return limit.clone();
		}
		let class = key.split(':').next().unwrap_or_default();
		match class {
			"rpc" if key == rpc_key(NetworkId::Solana) => ResourceLimit::solana_rpc(),
			"explorer" => ResourceLimit::explorer(),
			"marketplace" => ResourceLimit::marketplace(),
			_ => ResourceLimit::evm_rpc(),
		}
	}

	/// Acquires a slot using the resource's configured overflow behavior
	pub async fn acquire(&self, key: &str, operation: &str) -> Result<Admission, RateLimitError> {
		let on_limit = if self.limit_for(key).error_on_limit {
			OnLimit::Error
		} else {
			OnLimit::Skip
		};
		self.acquire_with(key, operation, on_limit).await
	}

	/// Acquires a slot with an explicit overflow behavior
	///
	/// Teardown always surfaces as [`RateLimitError::Destroyed`], whatever `on_limit`
	/// says.
	pub async fn acquire_with(
		&self,
		key: &str,
		operation: &str,
		on_limit: OnLimit,
	) -> Result<Admission, RateLimitError> {
		let bucket = {
			let mut buckets = self.buckets();
			// Checked under the lock so a concurrent destroy cannot miss this caller
			if self.is_destroyed() {
				return Err(RateLimitError::destroyed(key, operation));
			}
			buckets
				.entry(key.to_string())
				.or_insert_with(|| Arc::new(Bucket::new(self.limit_for(key))))
				.clone()
		};

		// Nobody is waiting, so a free slot can be taken without queueing
		if bucket.queued() == 0 && bucket.pacer.check().is_ok() {
			return Ok(Admission::Granted);
		}

		let _slot = match bucket.queue.try_acquire() {
			Ok(slot) => slot,
			Err(TryAcquireError::NoPermits) => {
				tracing::debug!(resource = key, operation, "Rate limit queue full");
				return overflow(key, operation, on_limit, "queue full");
			}
			Err(TryAcquireError::Closed) => return Err(RateLimitError::destroyed(key, operation)),
		};

		let mut shutdown = self.shutdown.subscribe();
		let wait = async {
			let _head = bucket
				.head
				.acquire()
				.await
				.map_err(|_| RateLimitError::destroyed(key, operation))?;
			bucket.pacer.until_ready().await;
			Ok::<(), RateLimitError>(())
		};

		tokio::select! {
			_ = shutdown.wait_for(|destroyed| *destroyed) => {
				Err(RateLimitError::destroyed(key, operation))
			}
			waited = tokio::time::timeout(bucket.limit.timeout, wait) => match waited {
				Ok(Ok(())) => Ok(Admission::Granted),
				Ok(Err(e)) => Err(e),
				Err(_) => {
					tracing::debug!(resource = key, operation, "Rate limit wait timed out");
					overflow(key, operation, on_limit, "wait timed out")
				}
			},
		}
	}

	/// Callers currently waiting on a resource
	pub fn queued(&self, key: &str) -> usize {
		self.buckets()
			.get(key)
			.map(|bucket| bucket.queued())
			.unwrap_or(0)
	}

	/// Resource keys that were used at least once, sorted
	pub fn resources(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.buckets().keys().cloned().collect();
		keys.sort();
		keys
	}

	pub fn is_destroyed(&self) -> bool {
		self.destroyed.load(Ordering::SeqCst)
	}

	/// Releases all waiters with [`RateLimitError::Destroyed`] and refuses new callers
	pub fn destroy(&self) {
		let mut buckets = self.buckets();
		self.destroyed.store(true, Ordering::SeqCst);
		self.shutdown.send_replace(true);

		let released: usize = buckets.values().map(|bucket| bucket.queued()).sum();
		for bucket in buckets.values() {
			bucket.close();
		}
		buckets.clear();
		tracing::debug!(released, "Rate governor destroyed");
	}
}

fn overflow(
	key: &str,
	operation: &str,
	on_limit: OnLimit,
	reason: &str,
) -> Result<Admission, RateLimitError> {
	match on_limit {
		OnLimit::Error => Err(RateLimitError::exceeded(key, operation, reason)),
		OnLimit::Skip => Ok(Admission::Skipped),
	}
}
