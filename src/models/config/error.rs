//! Configuration error types.
//!
//! This module defines the error types that can occur during configuration
//! loading and validation.

use thiserror::Error;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
	/// Configuration validation failed
	#[error("Validation error: {0}")]
	ValidationError(String),

	/// Failed to parse configuration file
	#[error("Parse error: {0}")]
	ParseError(String),

	/// File system error during configuration loading
	#[error("File error: {0}")]
	FileError(String),
}

impl ConfigError {
	pub fn validation_error(msg: impl Into<String>) -> Self {
		Self::ValidationError(msg.into())
	}

	pub fn parse_error(msg: impl Into<String>) -> Self {
		Self::ParseError(msg.into())
	}

	pub fn file_error(msg: impl Into<String>) -> Self {
		Self::FileError(msg.into())
	}
}

impl From<std::io::Error> for ConfigError {
	fn from(err: std::io::Error) -> Self {
		Self::file_error(err.to_string())
	}
}

impl From<serde_json::Error> for ConfigError {
	fn from(err: serde_json::Error) -> Self {
		Self::parse_error(err.to_string())
	}
}
