//! Explorer client errors.

use thiserror::Error;

use crate::services::ratelimit::RateLimitError;

#[derive(Debug, Error)]
pub enum ExplorerError {
	/// The request could not be sent or the server failed
	#[error("Request error: {0}")]
	RequestError(String),

	/// The API answered with an error status
	#[error("API error: {0}")]
	ApiError(String),

	/// The API answered with something that could not be decoded
	#[error("Response error: {0}")]
	ResponseError(String),

	#[error(transparent)]
	RateLimited(#[from] RateLimitError),
}

impl ExplorerError {
	pub fn request_error(msg: impl Into<String>) -> Self {
		Self::RequestError(msg.into())
	}

	pub fn api_error(msg: impl Into<String>) -> Self {
		Self::ApiError(msg.into())
	}

	pub fn response_error(msg: impl Into<String>) -> Self {
		Self::ResponseError(msg.into())
	}

	/// Whether another attempt may succeed
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::RequestError(_) => true,
			Self::ApiError(msg) => msg.to_ascii_lowercase().contains("rate limit"),
			Self::ResponseError(_) | Self::RateLimited(_) => false,
		}
	}
}

impl From<reqwest_middleware::Error> for ExplorerError {
	fn from(err: reqwest_middleware::Error) -> Self {
		Self::request_error(err.to_string())
	}
}
