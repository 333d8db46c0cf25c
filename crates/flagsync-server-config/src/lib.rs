// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the flagsync server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`FLAGSYNC_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use flagsync_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::{ConfigError, Result};
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub cache: CacheConfig,
	pub stream: StreamConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`FLAGSYNC_SERVER_*`)
/// 2. Config file (`/etc/flagsync/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<std::path::PathBuf>) -> Result<ServerConfig> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig> {
	let http = layer.http.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize();
	let cache = layer.cache.unwrap_or_default().finalize();
	let stream = layer.stream.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();

	validate_config(&cache, &stream)?;

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		cache_backend = %cache.backend,
		heartbeat_interval_secs = stream.heartbeat_interval_secs,
		topic = %stream.topic,
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		database,
		cache,
		stream,
		logging,
	})
}

/// Validate cross-field configuration rules.
fn validate_config(cache: &CacheConfig, stream: &StreamConfig) -> Result<()> {
	if cache.backend == CacheBackend::Redis && cache.redis_url.is_none() {
		return Err(ConfigError::Validation(
			"cache backend 'redis' requires FLAGSYNC_SERVER_CACHE_REDIS_URL (or cache.redis_url)"
				.to_string(),
		));
	}

	if stream.heartbeat_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"stream.heartbeat_interval_secs must be greater than 0".to_string(),
		));
	}

	if stream.sink_buffer == 0 || stream.ingest_queue_capacity == 0 {
		return Err(ConfigError::Validation(
			"stream buffers must hold at least one item".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_redis_backend_requires_url() {
		let cache = CacheConfig {
			backend: CacheBackend::Redis,
			redis_url: None,
			..Default::default()
		};
		let result = validate_config(&cache, &StreamConfig::default());
		assert!(result.unwrap_err().to_string().contains("requires"));
	}

	#[test]
	fn test_redis_backend_with_url_ok() {
		let cache = CacheConfig {
			backend: CacheBackend::Redis,
			redis_url: Some("redis://localhost:6379".to_string()),
			..Default::default()
		};
		assert!(validate_config(&cache, &StreamConfig::default()).is_ok());
	}

	#[test]
	fn test_zero_heartbeat_rejected() {
		let stream = StreamConfig {
			heartbeat_interval_secs: 0,
			..Default::default()
		};
		assert!(matches!(
			validate_config(&CacheConfig::default(), &stream),
			Err(ConfigError::Validation(_))
		));
	}

	#[test]
	fn test_finalize_empty_layer_uses_defaults() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
		assert_eq!(config.database.url, "sqlite:./flagsync.db");
		assert_eq!(config.cache.backend, CacheBackend::Memory);
		assert_eq!(config.stream.topic, "flagsync:invalidations");
	}

	#[test]
	fn test_socket_addr() {
		let config = ServerConfig {
			http: HttpConfig {
				host: "127.0.0.1".to_string(),
				port: 9000,
			},
			..Default::default()
		};
		assert_eq!(config.socket_addr(), "127.0.0.1:9000");
	}

	#[test]
	fn test_load_with_file_overrides_defaults() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
[database]
url = "sqlite:/var/lib/flagsync/flags.db"

[stream]
sink_buffer = 16
"#
		)
		.unwrap();

		let config = load_config_with_file(file.path()).unwrap();
		assert_eq!(config.database.url, "sqlite:/var/lib/flagsync/flags.db");
		assert_eq!(config.stream.sink_buffer, 16);
		assert_eq!(config.stream.heartbeat_interval_secs, 30);
	}
}
