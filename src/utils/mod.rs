//! Utility modules for common functionality.
//!
//! - http: Retrying HTTP client construction
//! - logging: Tracing subscriber setup
//! - metrics: Metrics aggregation and the Prometheus endpoint
//! - pagination: Paginated fetching for explorer APIs
//! - parsing: Hex quantities and decimal balance formatting
//! - retry: Shared exponential backoff with jitter

pub mod http;
pub mod logging;
pub mod metrics;
pub mod pagination;
pub mod parsing;
pub mod retry;

pub use http::{create_retryable_http_client, HttpRetryConfig, TransientErrorRetryStrategy};
pub use pagination::{fetch_paginated, PaginationOptions};
pub use retry::{BackoffPolicy, WithRetry};
