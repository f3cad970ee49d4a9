//! Metrics aggregation for the monitoring engine.
//!
//! - Per-network counters for reconnections, emitted events and errors.
//! - Per-operation latency samples kept in a bounded ring of the last
//!   [`LATENCY_SAMPLE_LIMIT`] observations.
//!
//! Every aggregator owns its own Prometheus [`Registry`], so several engines can run
//! in one process (and in one test binary) without clobbering each other.

pub mod server;

use chrono::{DateTime, Utc};
use prometheus::{
	Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use std::{
	collections::{BTreeMap, HashMap, VecDeque},
	sync::Mutex,
	time::Duration,
};

use crate::models::NetworkId;

/// Latency samples retained per (network, operation)
pub const LATENCY_SAMPLE_LIMIT: usize = 100;

/// Summary of the retained latency samples of one operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
	pub count: usize,
	pub avg_ms: f64,
	pub min_ms: f64,
	pub max_ms: f64,
	pub last_ms: f64,
}

impl LatencyStats {
	fn from_samples(samples: &VecDeque<f64>) -> Option<Self> {
		let last = *samples.back()?;
		let (min, max, sum) = samples.iter().fold(
			(f64::MAX, f64::MIN, 0.0),
			|(min, max, sum), &value| (min.min(value), max.max(value), sum + value),
		);
		Some(Self {
			count: samples.len(),
			avg_ms: sum / samples.len() as f64,
			min_ms: min,
			max_ms: max,
			last_ms: last,
		})
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
	pub reconnections: u64,
	/// Emitted events keyed by event name
	pub events: BTreeMap<String, u64>,
	/// Errors keyed by error class
	pub errors: BTreeMap<String, u64>,
	/// Latency summaries keyed by operation
	pub latency: BTreeMap<String, LatencyStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
	pub networks: BTreeMap<NetworkId, NetworkMetrics>,
	pub taken_at: DateTime<Utc>,
}

impl MetricsSnapshot {
	pub fn network(&self, network: NetworkId) -> Option<&NetworkMetrics> {
		self.networks.get(&network)
	}

	pub fn total_events(&self) -> u64 {
		self.networks
			.values()
			.flat_map(|metrics| metrics.events.values())
			.sum()
	}
}

#[derive(Default)]
struct NetworkState {
	reconnections: u64,
	events: HashMap<String, u64>,
	errors: HashMap<String, u64>,
	latency: HashMap<String, VecDeque<f64>>,
}

/// Collects counters and latency samples of one engine instance
pub struct MetricsAggregator {
	registry: Registry,
	reconnections: IntCounterVec,
	events: IntCounterVec,
	errors: IntCounterVec,
	latency: HistogramVec,
	state: Mutex<HashMap<NetworkId, NetworkState>>,
}

impl MetricsAggregator {
	pub fn new() -> Result<Self, prometheus::Error> {
		let registry = Registry::new();

		let reconnections = IntCounterVec::new(
			Opts::new("reconnections_total", "Successful provider reconnections"),
			&["network"],
		)?;
		let events = IntCounterVec::new(
			Opts::new("events_total", "Monitoring events emitted"),
			&["network", "event"],
		)?;
		let errors = IntCounterVec::new(
			Opts::new("errors_total", "Errors observed while monitoring"),
			&["network", "error"],
		)?;
		let latency = HistogramVec::new(
			HistogramOpts::new("operation_latency_seconds", "Latency of provider operations")
				.buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
			&["network", "operation"],
		)?;

		registry.register(Box::new(reconnections.clone()))?;
		registry.register(Box::new(events.clone()))?;
		registry.register(Box::new(errors.clone()))?;
		registry.register(Box::new(latency.clone()))?;

		Ok(Self {
			registry,
			reconnections,
			events,
			errors,
			latency,
			state: Mutex::new(HashMap::new()),
		})
	}

	fn with_network<R>(&self, network: NetworkId, f: impl FnOnce(&mut NetworkState) -> R) -> R {
		let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		f(state.entry(network).or_default())
	}

	pub fn record_reconnection(&self, network: NetworkId) {
		self.reconnections
			.with_label_values(&[network.slug()])
			.inc();
		self.with_network(network, |state| state.reconnections += 1);
	}

	pub fn record_event(&self, network: NetworkId, event: &str) {
		self.events.with_label_values(&[network.slug(), event]).inc();
		self.with_network(network, |state| {
			*state.events.entry(event.to_string()).or_insert(0) += 1;
		});
	}

	pub fn record_error(&self, network: NetworkId, error: &str) {
		self.errors.with_label_values(&[network.slug(), error]).inc();
		self.with_network(network, |state| {
			*state.errors.entry(error.to_string()).or_insert(0) += 1;
		});
	}

	pub fn record_latency(&self, network: NetworkId, operation: &str, elapsed: Duration) {
		self.latency
			.with_label_values(&[network.slug(), operation])
			.observe(elapsed.as_secs_f64());
		let millis = elapsed.as_secs_f64() * 1000.0;
		self.with_network(network, |state| {
			let samples = state.latency.entry(operation.to_string()).or_default();
			if samples.len() == LATENCY_SAMPLE_LIMIT {
				samples.pop_front();
			}
			samples.push_back(millis);
		});
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		let networks = state
			.iter()
			.map(|(network, state)| {
				let metrics = NetworkMetrics {
					reconnections: state.reconnections,
					events: state.events.iter().map(|(k, v)| (k.clone(), *v)).collect(),
					errors: state.errors.iter().map(|(k, v)| (k.clone(), *v)).collect(),
					latency: state
						.latency
						.iter()
						.filter_map(|(op, samples)| {
							LatencyStats::from_samples(samples).map(|stats| (op.clone(), stats))
						})
						.collect(),
				};
				(*network, metrics)
			})
			.collect();

		MetricsSnapshot {
			networks,
			taken_at: Utc::now(),
		}
	}

	/// Clears every counter and latency ring
	pub fn reset(&self) {
		self.reconnections.reset();
		self.events.reset();
		self.errors.reset();
		self.latency.reset();
		self.state
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clear();
	}

	/// Renders the Prometheus text exposition format
	pub fn gather(&self) -> Result<Vec<u8>, prometheus::Error> {
		let encoder = TextEncoder::new();
		let mut buffer = Vec::new();
		encoder.encode(&self.registry.gather(), &mut buffer)?;
		Ok(buffer)
	}
}
