//! Retry mechanism for handling transient failures in async operations.
//!
//! [`BackoffPolicy`] computes exponential delays with jitter and is shared by every
//! retry loop in the crate: the reconnection state machine schedules its attempts
//! with it, and [`WithRetry`] wraps one-off operations such as explorer requests.

use rand::Rng;
use std::{future::Future, time::Duration};

/// Upper bound of the random jitter factor added to each delay
pub const DEFAULT_JITTER: f64 = 0.3;

/// Exponential backoff with jitter
///
/// `delay(n) = min(max_delay, base_delay * 2^n * (1 + jitter))` where `jitter` is
/// uniform in `[0, max_jitter]`.
#[derive(Clone, Debug, PartialEq)]
pub struct BackoffPolicy {
	/// Maximum number of attempts before giving up
	pub max_attempts: u32,
	/// Delay before the first retry
	pub base_delay: Duration,
	/// Cap applied after jitter
	pub max_delay: Duration,
	/// Upper bound of the jitter factor
	pub max_jitter: f64,
}

impl Default for BackoffPolicy {
	/// 3 attempts, 1 second base delay, 8 seconds cap, 30% jitter
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(8),
			max_jitter: DEFAULT_JITTER,
		}
	}
}

impl BackoffPolicy {
	pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
		Self {
			max_attempts,
			base_delay,
			max_delay,
			max_jitter: DEFAULT_JITTER,
		}
	}

	pub fn with_jitter(mut self, max_jitter: f64) -> Self {
		self.max_jitter = max_jitter.max(0.0);
		self
	}

	/// Delay before attempt `attempt` (zero based) without jitter
	pub fn base_delay_for(&self, attempt: u32) -> Duration {
		self.scaled_delay(attempt, 0.0)
	}

	/// Delay before attempt `attempt` (zero based) with random jitter applied
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let jitter = if self.max_jitter > 0.0 {
			rand::rng().random_range(0.0..=self.max_jitter)
		} else {
			0.0
		};
		self.scaled_delay(attempt, jitter)
	}

	fn scaled_delay(&self, attempt: u32, jitter: f64) -> Duration {
		// 2^31 and beyond saturate the cap anyway
		let factor = 2f64.powi(attempt.min(31) as i32) * (1.0 + jitter);
		let millis = self.base_delay.as_millis() as f64 * factor;
		let capped = millis.min(self.max_delay.as_millis() as f64);
		Duration::from_millis(capped as u64)
	}

	/// Whether another attempt is allowed after `attempts` failures
	pub fn should_retry(&self, attempts: u32) -> bool {
		attempts < self.max_attempts
	}
}

/// Handler for retrying operations with exponential backoff
pub struct WithRetry {
	policy: BackoffPolicy,
}

impl WithRetry {
	/// Creates a new retry handler with a custom policy
	pub fn new(policy: BackoffPolicy) -> Self {
		Self { policy }
	}

	/// Creates a new retry handler with the default policy
	pub fn with_default_config() -> Self {
		Self {
			policy: BackoffPolicy::default(),
		}
	}

	/// Attempts an async operation with the configured retry behavior
	///
	/// # Arguments
	/// * `operation` - Creates the future for each attempt
	/// * `is_retryable` - Decides whether a failure is worth another attempt
	///
	/// # Returns
	/// * `Ok(T)` - If an attempt succeeds
	/// * `Err(E)` - The last error once attempts are exhausted or the error is final
	pub async fn attempt<F, Fut, T, E, R>(&self, operation: F, is_retryable: R) -> Result<T, E>
	where
		F: Fn() -> Fut + Send + Sync,
		Fut: Future<Output = Result<T, E>> + Send,
		T: Send,
		E: std::fmt::Display + Send,
		R: Fn(&E) -> bool + Send + Sync,
	{
		let mut attempt = 0;
		loop {
			match operation().await {
				Ok(value) => return Ok(value),
				Err(e) => {
					attempt += 1;
					if !self.policy.should_retry(attempt) || !is_retryable(&e) {
						return Err(e);
					}

					let delay = self.policy.delay_for(attempt - 1);
					tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying operation");
					tokio::time::sleep(delay).await;
				}
			}
		}
	}
}
