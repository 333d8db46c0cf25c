// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared cache configuration section.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Seven days.
pub const DEFAULT_API_KEY_TTL_SECS: u64 = 604_800;
pub const DEFAULT_API_KEY_MEMO_CAPACITY: usize = 1024;
/// Five minutes. Bounds how long a revoked key keeps resolving in one process.
pub const DEFAULT_API_KEY_MEMO_TTL_SECS: u64 = 300;

/// Where materialized configs and API key lookups are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
	/// Per-process map. Only suitable for a single server instance.
	#[default]
	Memory,
	/// Shared Redis instance; also carries the invalidation topic.
	Redis,
}

impl std::fmt::Display for CacheBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			CacheBackend::Memory => write!(f, "memory"),
			CacheBackend::Redis => write!(f, "redis"),
		}
	}
}

impl std::str::FromStr for CacheBackend {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"memory" => Ok(CacheBackend::Memory),
			"redis" => Ok(CacheBackend::Redis),
			_ => Err(ConfigError::InvalidValue {
				key: "backend".to_string(),
				message: format!("unknown cache backend '{s}', expected 'memory' or 'redis'"),
			}),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheConfigLayer {
	pub backend: Option<CacheBackend>,
	pub redis_url: Option<String>,
	pub api_key_ttl_secs: Option<u64>,
	pub api_key_memo_capacity: Option<usize>,
	pub api_key_memo_ttl_secs: Option<u64>,
}

impl CacheConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.redis_url.is_some() {
			self.redis_url = other.redis_url;
		}
		if other.api_key_ttl_secs.is_some() {
			self.api_key_ttl_secs = other.api_key_ttl_secs;
		}
		if other.api_key_memo_capacity.is_some() {
			self.api_key_memo_capacity = other.api_key_memo_capacity;
		}
		if other.api_key_memo_ttl_secs.is_some() {
			self.api_key_memo_ttl_secs = other.api_key_memo_ttl_secs;
		}
	}

	pub fn finalize(self) -> CacheConfig {
		CacheConfig {
			backend: self.backend.unwrap_or_default(),
			redis_url: self.redis_url,
			api_key_ttl_secs: self.api_key_ttl_secs.unwrap_or(DEFAULT_API_KEY_TTL_SECS),
			api_key_memo_capacity: self
				.api_key_memo_capacity
				.unwrap_or(DEFAULT_API_KEY_MEMO_CAPACITY),
			api_key_memo_ttl_secs: self
				.api_key_memo_ttl_secs
				.unwrap_or(DEFAULT_API_KEY_MEMO_TTL_SECS),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
	pub backend: CacheBackend,
	pub redis_url: Option<String>,
	pub api_key_ttl_secs: u64,
	pub api_key_memo_capacity: usize,
	pub api_key_memo_ttl_secs: u64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		CacheConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = CacheConfig::default();
		assert_eq!(config.backend, CacheBackend::Memory);
		assert!(config.redis_url.is_none());
		assert_eq!(config.api_key_ttl_secs, 604_800);
		assert_eq!(config.api_key_memo_capacity, 1024);
		assert_eq!(config.api_key_memo_ttl_secs, 300);
	}

	#[test]
	fn test_layer_finalize_with_values() {
		let layer = CacheConfigLayer {
			backend: Some(CacheBackend::Redis),
			redis_url: Some("redis://localhost:6379".to_string()),
			api_key_ttl_secs: Some(60),
			..Default::default()
		};
		let config = layer.finalize();
		assert_eq!(config.backend, CacheBackend::Redis);
		assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
		assert_eq!(config.api_key_ttl_secs, 60);
		assert_eq!(config.api_key_memo_capacity, 1024);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = CacheConfigLayer {
			backend: Some(CacheBackend::Redis),
			api_key_ttl_secs: Some(10),
			..Default::default()
		};
		let overlay = CacheConfigLayer {
			backend: Some(CacheBackend::Memory),
			api_key_ttl_secs: None,
			..Default::default()
		};
		base.merge(overlay);
		assert_eq!(base.backend, Some(CacheBackend::Memory));
		assert_eq!(base.api_key_ttl_secs, Some(10));
	}

	#[test]
	fn test_backend_from_str() {
		assert_eq!("redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
		assert_eq!("MEMORY".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
		assert!("memcached".parse::<CacheBackend>().is_err());
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = CacheConfig {
			backend: CacheBackend::Redis,
			redis_url: Some("redis://cache:6379/1".to_string()),
			api_key_ttl_secs: 3600,
			api_key_memo_capacity: 16,
			api_key_memo_ttl_secs: 30,
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: CacheConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let layer: CacheConfigLayer = toml::from_str(r#"backend = "redis""#).unwrap();
		assert_eq!(layer.backend, Some(CacheBackend::Redis));
		assert!(layer.redis_url.is_none());
	}
}
