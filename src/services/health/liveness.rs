//! Liveness policy shared by the per-network heartbeat and the global health sweep.
//!
//! A connection moves `Alive -> Suspect` on a failed probe and `Suspect -> Dead` on the
//! second consecutive failure, or on any failure once the last success is older than
//! the staleness window. The sweep declares a connection dead without a probe failure
//! when no success was recorded within the sweep window. Both windows derive from the
//! heartbeat interval and the probe timeout so the two checks never disagree about
//! what "stale" means.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::{ConnectionStatus, Liveness, MonitorConfig};

/// Consecutive probe failures that declare a connection dead
pub const FAILURES_TO_DEAD: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
	pub heartbeat_interval: Duration,
	pub ping_timeout: Duration,
}

impl LivenessPolicy {
	pub fn new(heartbeat_interval: Duration, ping_timeout: Duration) -> Self {
		Self {
			heartbeat_interval,
			ping_timeout,
		}
	}

	pub fn from_config(config: &MonitorConfig) -> Self {
		Self::new(config.heartbeat_interval, config.ping_timeout)
	}

	/// Age of the last success past which a single probe failure is fatal
	pub fn staleness_window(&self) -> Duration {
		self.heartbeat_interval + self.ping_timeout * 2
	}

	/// Age of the last success past which the sweep declares the connection dead
	pub fn sweep_window(&self) -> Duration {
		self.heartbeat_interval + self.ping_timeout * 3
	}

	pub fn record_success(&self, status: &mut ConnectionStatus, now: DateTime<Utc>) {
		status.liveness = Liveness::Alive;
		status.consecutive_failures = 0;
		status.last_ping_time = Some(now);
	}

	/// Applies a failed probe
	///
	/// # Returns
	/// * `true` - The connection just entered `Dead`
	/// * `false` - It was already dead or is only suspect
	pub fn record_failure(
		&self,
		status: &mut ConnectionStatus,
		now: DateTime<Utc>,
		error: &str,
	) -> bool {
		let previous = status.liveness;
		status.consecutive_failures = status.consecutive_failures.saturating_add(1);
		status.last_error = Some(error.to_string());

		let stale = exceeds(status.last_ping_time, now, self.staleness_window());
		status.liveness = if status.consecutive_failures >= FAILURES_TO_DEAD || stale {
			Liveness::Dead
		} else {
			Liveness::Suspect
		};

		previous != Liveness::Dead && status.liveness == Liveness::Dead
	}

	/// Whether the sweep should declare the connection dead
	pub fn is_stale(&self, status: &ConnectionStatus, now: DateTime<Utc>) -> bool {
		status.connected
			&& !status.is_reconnecting
			&& exceeds(status.last_ping_time, now, self.sweep_window())
	}
}

impl Default for LivenessPolicy {
	fn default() -> Self {
		Self::from_config(&MonitorConfig::default())
	}
}

/// A connection that never succeeded counts as stale
fn exceeds(last: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
	match last {
		Some(last) => now
			.signed_duration_since(last)
			.to_std()
			.map(|age| age > window)
			.unwrap_or(false),
		None => true,
	}
}
