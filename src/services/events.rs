//! Event bus shared by the monitoring engine and the reconnection state machine.
//!
//! Every emitted event is counted in the metrics aggregator before it is published,
//! so counts stay accurate even when nobody is subscribed.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::{models::MonitorEvent, utils::metrics::MetricsAggregator};

#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<MonitorEvent>,
	metrics: Arc<MetricsAggregator>,
}

impl EventBus {
	pub fn new(capacity: usize, metrics: Arc<MetricsAggregator>) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender, metrics }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
		self.sender.subscribe()
	}

	pub fn emit(&self, event: MonitorEvent) {
		self.metrics.record_event(event.network(), event.name());
		tracing::debug!(network = %event.network(), event = event.name(), "Emitting event");
		// No subscribers is not an error
		let _ = self.sender.send(event);
	}

	pub fn metrics(&self) -> &Arc<MetricsAggregator> {
		&self.metrics
	}
}
