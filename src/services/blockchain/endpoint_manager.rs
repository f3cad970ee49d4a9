//! Manages the rotation of a network's RPC endpoints
//!
//! Endpoints are kept in weight order. The reconnection state machine marks the
//! endpoints that fail verification and rotates to the next one that has not failed
//! yet. Once every endpoint has failed the marks are cleared and rotation starts over,
//! so a network never runs out of candidates.

use std::{collections::HashSet, sync::Arc};
use tokio::sync::{Mutex, RwLock};

use crate::services::blockchain::BlockChainError;

#[derive(Clone, Debug)]
pub struct EndpointManager {
	/// The currently active endpoint URL
	pub active_url: Arc<RwLock<String>>,
	/// Remaining endpoints in rotation order
	pub fallback_urls: Arc<RwLock<Vec<String>>>,
	failed_urls: Arc<RwLock<HashSet<String>>>,
	rotation_lock: Arc<Mutex<()>>,
}

impl EndpointManager {
	/// Creates a manager from URLs sorted by descending weight
	///
	/// The first URL becomes active, the others are fallbacks.
	pub fn new(urls: Vec<String>) -> Result<Self, BlockChainError> {
		let mut urls = urls.into_iter();
		let active = urls
			.next()
			.ok_or_else(|| BlockChainError::connection_error("No RPC endpoint configured"))?;

		Ok(Self {
			active_url: Arc::new(RwLock::new(active)),
			fallback_urls: Arc::new(RwLock::new(urls.collect())),
			failed_urls: Arc::new(RwLock::new(HashSet::new())),
			rotation_lock: Arc::new(Mutex::new(())),
		})
	}

	pub async fn get_active_url(&self) -> String {
		self.active_url.read().await.clone()
	}

	/// Whether another endpoint is available to rotate to
	pub async fn should_rotate(&self) -> bool {
		!self.fallback_urls.read().await.is_empty()
	}

	/// Active URL followed by the fallbacks, in rotation order
	pub async fn all_urls(&self) -> Vec<String> {
		let mut urls = vec![self.active_url.read().await.clone()];
		urls.extend(self.fallback_urls.read().await.iter().cloned());
		urls
	}

	pub async fn mark_failed(&self, url: &str) {
		self.failed_urls.write().await.insert(url.to_string());
	}

	pub async fn mark_healthy(&self, url: &str) {
		self.failed_urls.write().await.remove(url);
	}

	pub async fn is_failed(&self, url: &str) -> bool {
		self.failed_urls.read().await.contains(url)
	}

	/// Makes `url` the active endpoint, moving the previous one to the fallbacks
	pub async fn set_active(&self, url: &str) {
		let _guard = self.rotation_lock.lock().await;
		let mut active = self.active_url.write().await;
		if *active == url {
			return;
		}
		let mut fallbacks = self.fallback_urls.write().await;
		fallbacks.retain(|candidate| candidate != url);
		fallbacks.push(std::mem::replace(&mut *active, url.to_string()));
	}

	/// Rotates to the next fallback that has not failed
	///
	/// The previous active URL moves to the back of the fallback list. When every
	/// fallback is marked failed, the marks are cleared and the first fallback is used.
	///
	/// # Returns
	/// * `Some(url)` - The new active URL
	/// * `None` - If the network has a single endpoint
	pub async fn rotate_url(&self) -> Option<String> {
		let _guard = self.rotation_lock.lock().await;
		let mut fallbacks = self.fallback_urls.write().await;
		if fallbacks.is_empty() {
			return None;
		}

		let mut failed = self.failed_urls.write().await;
		let position = match fallbacks.iter().position(|url| !failed.contains(url)) {
			Some(position) => position,
			None => {
				tracing::debug!("Every endpoint failed, clearing failure marks");
				failed.clear();
				0
			}
		};

		let next = fallbacks.remove(position);
		let mut active = self.active_url.write().await;
		let previous = std::mem::replace(&mut *active, next.clone());
		fallbacks.push(previous.clone());

		tracing::debug!(from = %previous, to = %next, "Rotated endpoint");
		Some(next)
	}
}
