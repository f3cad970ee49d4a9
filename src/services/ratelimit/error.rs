//! Rate governor errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
	/// The wait queue was full or the wait outlasted the resource timeout
	#[error("Rate limit exceeded for {resource} ({operation}): {reason}")]
	Exceeded {
		resource: String,
		operation: String,
		reason: String,
	},

	/// The governor was torn down while the caller waited
	#[error("Rate governor destroyed while {operation} waited on {resource}")]
	Destroyed { resource: String, operation: String },
}

impl RateLimitError {
	pub fn exceeded(
		resource: impl Into<String>,
		operation: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::Exceeded {
			resource: resource.into(),
			operation: operation.into(),
			reason: reason.into(),
		}
	}

	pub fn destroyed(resource: impl Into<String>, operation: impl Into<String>) -> Self {
		Self::Destroyed {
			resource: resource.into(),
			operation: operation.into(),
		}
	}
}
