use std::path::{Path, PathBuf};

use sable_queue::QueueConfig;
use sable_sync::SyncConfig;
use serde::{Deserialize, Serialize};

/// Host settings, usually loaded from a TOML file.
///
/// ```toml
/// [queue]
/// max_concurrent_reads = 64
/// shutdown_timeout_ms = 5000
///
/// [sync]
/// cache_capacity = 4096
/// request_timeout_ms = 30000
/// ```
///
/// Every field is optional; missing ones take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
	/// Request execution queue settings.
	pub queue: QueueConfig,
	/// Synchronization channel settings.
	pub sync: SyncConfig,
}

/// Failure to load a [`HostConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// The file could not be read.
	#[error("failed to read {}: {source}", path.display())]
	Io {
		/// Path that was read.
		path: PathBuf,
		/// Underlying error.
		#[source]
		source: std::io::Error,
	},
	/// The contents are not a valid configuration.
	#[error("invalid configuration: {0}")]
	Parse(#[from] toml::de::Error),
}

impl HostConfig {
	/// Parses a configuration from TOML text.
	pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a configuration file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&text)
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		assert_eq!(HostConfig::from_toml_str("").unwrap(), HostConfig::default());
		assert_eq!(HostConfig::default().queue.max_concurrent_reads, 64);
		assert_eq!(HostConfig::default().sync.request_timeout_ms, 30_000);
	}

	#[test]
	fn partial_sections_keep_other_defaults() {
		let config = HostConfig::from_toml_str(
			r#"
			[queue]
			max_concurrent_reads = 0

			[sync]
			cache_capacity = 16
			"#,
		)
		.unwrap();
		assert_eq!(config.queue.max_concurrent_reads, 0);
		assert_eq!(config.queue.shutdown_timeout_ms, 5_000);
		assert_eq!(config.sync.cache_capacity, 16);
		assert_eq!(config.sync.request_timeout_ms, 30_000);
	}

	#[test]
	fn unknown_keys_are_rejected() {
		let err = HostConfig::from_toml_str("[queue]\nmax_reads = 3\n").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn missing_file_reports_its_path() {
		let err = HostConfig::load("/nonexistent/sable.toml").unwrap_err();
		assert!(err.to_string().contains("/nonexistent/sable.toml"));
	}
}
