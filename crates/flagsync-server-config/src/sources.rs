// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	CacheBackend, CacheConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer,
	StreamConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/flagsync/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: FLAGSYNC_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()),
			cache: Some(load_cache_from_env()?),
			stream: Some(load_stream_from_env()?),
			logging: Some(load_logging_from_env()),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid usize value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("FLAGSYNC_SERVER_HOST"),
		port: env_u16("FLAGSYNC_SERVER_PORT")?,
	})
}

fn load_database_from_env() -> DatabaseConfigLayer {
	DatabaseConfigLayer {
		url: env_var("FLAGSYNC_SERVER_DATABASE_URL"),
	}
}

fn load_cache_from_env() -> Result<CacheConfigLayer, ConfigError> {
	let backend = match env_var("FLAGSYNC_SERVER_CACHE_BACKEND") {
		Some(v) => Some(v.parse::<CacheBackend>().map_err(|_| ConfigError::InvalidValue {
			key: "FLAGSYNC_SERVER_CACHE_BACKEND".to_string(),
			message: format!("unknown cache backend '{v}', expected 'memory' or 'redis'"),
		})?),
		None => None,
	};

	Ok(CacheConfigLayer {
		backend,
		redis_url: env_var("FLAGSYNC_SERVER_CACHE_REDIS_URL"),
		api_key_ttl_secs: env_u64("FLAGSYNC_SERVER_CACHE_API_KEY_TTL_SECS")?,
		api_key_memo_capacity: env_usize("FLAGSYNC_SERVER_CACHE_API_KEY_MEMO_CAPACITY")?,
		api_key_memo_ttl_secs: env_u64("FLAGSYNC_SERVER_CACHE_API_KEY_MEMO_TTL_SECS")?,
	})
}

fn load_stream_from_env() -> Result<StreamConfigLayer, ConfigError> {
	Ok(StreamConfigLayer {
		heartbeat_interval_secs: env_u64("FLAGSYNC_SERVER_STREAM_HEARTBEAT_INTERVAL_SECS")?,
		sink_buffer: env_usize("FLAGSYNC_SERVER_STREAM_SINK_BUFFER")?,
		topic: env_var("FLAGSYNC_SERVER_STREAM_TOPIC"),
		ingest_queue_capacity: env_usize("FLAGSYNC_SERVER_STREAM_INGEST_QUEUE_CAPACITY")?,
	})
}

fn load_logging_from_env() -> LoggingConfigLayer {
	LoggingConfigLayer {
		level: env_var("FLAGSYNC_SERVER_LOG_LEVEL"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_precedence_order() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
	}

	#[test]
	fn test_missing_toml_file_is_empty_layer() {
		let source = TomlSource::new("/nonexistent/flagsync/server.toml");
		let layer = source.load().unwrap();
		assert!(layer.http.is_none());
		assert!(layer.cache.is_none());
	}

	#[test]
	fn test_toml_file_is_parsed() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[http]
host = "127.0.0.1"

[stream]
heartbeat_interval_secs = 10
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.http.unwrap().host.as_deref(), Some("127.0.0.1"));
		assert_eq!(layer.stream.unwrap().heartbeat_interval_secs, Some(10));
	}

	#[test]
	fn test_malformed_toml_is_parse_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[http\nport = ").unwrap();

		let result = TomlSource::new(file.path()).load();
		assert!(matches!(result, Err(ConfigError::TomlParse { .. })));
	}

	#[test]
	fn test_env_var_treats_empty_as_unset() {
		std::env::set_var("FLAGSYNC_TEST_EMPTY_VAR", "");
		assert!(env_var("FLAGSYNC_TEST_EMPTY_VAR").is_none());
		std::env::remove_var("FLAGSYNC_TEST_EMPTY_VAR");
	}

	#[test]
	fn test_env_u16_rejects_garbage() {
		std::env::set_var("FLAGSYNC_TEST_BAD_PORT", "eighty");
		let err = env_u16("FLAGSYNC_TEST_BAD_PORT").unwrap_err();
		assert!(err.to_string().contains("invalid u16 value 'eighty'"));
		std::env::remove_var("FLAGSYNC_TEST_BAD_PORT");
	}

	#[test]
	fn test_env_usize_parses() {
		std::env::set_var("FLAGSYNC_TEST_BUFFER", "128");
		assert_eq!(env_usize("FLAGSYNC_TEST_BUFFER").unwrap(), Some(128));
		std::env::remove_var("FLAGSYNC_TEST_BUFFER");
		assert_eq!(env_usize("FLAGSYNC_TEST_BUFFER").unwrap(), None);
	}
}
