//! WebSocket connection state shared between the transport handle and its reader task.

use serde_json::Value;
use std::{collections::HashMap, time::Instant};
use tokio::sync::{mpsc, oneshot};

/// A request waiting for its response
#[derive(Debug)]
pub struct PendingRequest {
	pub response: oneshot::Sender<Value>,
	/// Set for subscription requests: the reader registers this sink under the
	/// returned subscription id before handing the response over, so no notification
	/// can slip through between the two.
	pub subscription: Option<mpsc::Sender<Value>>,
}

/// Dispatch tables and health of one socket
#[derive(Debug)]
pub struct WebSocketConnection {
	pub is_healthy: bool,
	pub pending: HashMap<u64, PendingRequest>,
	/// Notification sinks keyed by the serialized subscription id
	pub subscriptions: HashMap<String, mpsc::Sender<Value>>,
	/// Ping payloads waiting for their pong
	pub pings: HashMap<Vec<u8>, oneshot::Sender<()>>,
	last_activity: Instant,
}

impl Default for WebSocketConnection {
	fn default() -> Self {
		Self {
			is_healthy: true,
			pending: HashMap::new(),
			subscriptions: HashMap::new(),
			pings: HashMap::new(),
			last_activity: Instant::now(),
		}
	}
}

impl WebSocketConnection {
	pub fn update_activity(&mut self) {
		self.last_activity = Instant::now();
	}

	pub fn last_activity(&self) -> Instant {
		self.last_activity
	}

	/// Marks the socket dead and drops every waiter
	///
	/// Dropping the senders wakes pending requests and pings with a receive error and
	/// ends every subscription stream.
	pub fn shutdown(&mut self) {
		self.is_healthy = false;
		self.pending.clear();
		self.subscriptions.clear();
		self.pings.clear();
	}

	/// Routes a text frame
	///
	/// Responses complete their pending request, notifications are forwarded to their
	/// subscription. Returns the notification sink to feed, if any, so the caller can
	/// await channel capacity without holding the lock.
	pub fn dispatch(&mut self, message: Value) -> Option<(mpsc::Sender<Value>, Value)> {
		self.update_activity();

		if let Some(id) = message.get("id").and_then(Value::as_u64) {
			let request = self.pending.remove(&id)?;
			if let Some(sink) = request.subscription {
				if let Some(subscription_id) = message.get("result").filter(|r| !r.is_null()) {
					self.subscriptions.insert(subscription_id.to_string(), sink);
				}
			}
			let _ = request.response.send(message);
			return None;
		}

		let params = message.get("params")?;
		let subscription_id = params.get("subscription")?.to_string();
		if self.subscriptions.get(&subscription_id)?.is_closed() {
			self.subscriptions.remove(&subscription_id);
			return None;
		}
		let sink = self.subscriptions.get(&subscription_id)?.clone();
		Some((sink, params.get("result").cloned().unwrap_or(Value::Null)))
	}

	pub fn complete_ping(&mut self, payload: &[u8]) {
		self.update_activity();
		if let Some(waiter) = self.pings.remove(payload) {
			let _ = waiter.send(());
		}
	}
}
