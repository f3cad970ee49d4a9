//! Paginated fetching for explorer and indexer APIs.
//!
//! Pages are requested one at a time, 1-based, until a short page arrives or one of
//! the bounds is reached. A delay between pages keeps sibling callers of the same
//! rate-governed resource from starving.

use std::{future::Future, time::Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationOptions {
	/// Items requested per page, a shorter page ends the walk
	pub page_size: usize,
	pub max_pages: u32,
	/// Items kept at most, extra items of the last page are dropped
	pub max_items: Option<usize>,
	pub page_delay: Duration,
}

impl Default for PaginationOptions {
	fn default() -> Self {
		Self {
			page_size: 100,
			max_pages: 10,
			max_items: None,
			page_delay: Duration::from_millis(250),
		}
	}
}

/// Walks pages produced by `fetch_page` and concatenates their items
///
/// # Arguments
/// * `options` - Page size, bounds and inter-page delay
/// * `fetch_page` - Fetches and normalizes one page given its 1-based number
///
/// # Returns
/// * `Result<Vec<T>, E>` - Collected items, or the first page error
pub async fn fetch_paginated<T, E, F, Fut>(
	options: &PaginationOptions,
	mut fetch_page: F,
) -> Result<Vec<T>, E>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<Vec<T>, E>>,
{
	let mut items = Vec::new();

	for page in 1..=options.max_pages {
		if page > 1 && !options.page_delay.is_zero() {
			tokio::time::sleep(options.page_delay).await;
		}

		let batch = fetch_page(page).await?;
		let full_page = batch.len() >= options.page_size;
		items.extend(batch);

		if let Some(max_items) = options.max_items {
			if items.len() >= max_items {
				items.truncate(max_items);
				break;
			}
		}

		if !full_page {
			break;
		}
		tracing::trace!(page, collected = items.len(), "Fetching next page");
	}

	Ok(items)
}
