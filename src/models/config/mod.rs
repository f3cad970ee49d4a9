//! Configuration loading and validation.
//!
//! Network definitions live in a directory of JSON files, one per network. The engine
//! tuning and the watch list of the service binary are single JSON files.

use serde::de::DeserializeOwned;
use std::path::Path;

mod error;
mod monitor_config;
mod network_config;
mod watch_config;

pub use error::ConfigError;
pub use monitor_config::{MonitorConfig, ResourceLimit};
pub use watch_config::{WatchList, WatchedAddress, WatchedCollection, WatchedNftTransfers};

/// Common interface for loading configuration files
pub trait ConfigLoader: Sized + DeserializeOwned {
	/// Directory (or file) used when no path is given
	const DEFAULT_PATH: &'static str;

	/// Load every JSON configuration file of a directory
	///
	/// Files that fail to parse or validate are skipped with a warning so that one
	/// broken file does not take the others down.
	fn load_all<T>(path: Option<&Path>) -> Result<T, ConfigError>
	where
		T: FromIterator<(String, Self)>,
	{
		let dir = path.unwrap_or(Path::new(Self::DEFAULT_PATH));
		if !dir.exists() {
			return Err(ConfigError::file_error(format!(
				"configuration directory not found: {}",
				dir.display()
			)));
		}

		let mut pairs = Vec::new();
		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();
			if !Self::is_json_file(&path) {
				continue;
			}

			let name = path
				.file_stem()
				.and_then(|s| s.to_str())
				.unwrap_or("unknown")
				.to_string();

			match Self::load_from_path(&path) {
				Ok(config) => pairs.push((name, config)),
				Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping configuration file"),
			}
		}

		Ok(T::from_iter(pairs))
	}

	/// Load and validate a single configuration file
	fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
		let file = std::fs::File::open(path)?;
		let config: Self = serde_json::from_reader(file)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<(), ConfigError>;

	fn is_json_file(path: &Path) -> bool {
		path.extension()
			.map(|ext| ext.to_string_lossy().to_lowercase() == "json")
			.unwrap_or(false)
	}
}

/// Serde helpers for durations expressed in milliseconds
pub(crate) mod millis {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
