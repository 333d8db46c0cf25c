// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	CacheConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, StreamConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub cache: Option<CacheConfigLayer>,
	#[serde(default)]
	pub stream: Option<StreamConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(&mut self.cache, other.cache, CacheConfigLayer::merge);
		merge_option(&mut self.stream, other.stream, StreamConfigLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sections::CacheBackend;

	#[test]
	fn test_merge_empty_layers() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer::default());
		assert!(base.http.is_none());
		assert!(base.cache.is_none());
	}

	#[test]
	fn test_merge_fills_missing_section() {
		let mut base = ServerConfigLayer::default();
		let other = ServerConfigLayer {
			stream: Some(StreamConfigLayer {
				heartbeat_interval_secs: Some(5),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(other);
		assert_eq!(
			base.stream.and_then(|s| s.heartbeat_interval_secs),
			Some(5)
		);
	}

	#[test]
	fn test_merge_nested_fields() {
		let mut base = ServerConfigLayer {
			cache: Some(CacheConfigLayer {
				backend: Some(CacheBackend::Redis),
				redis_url: Some("redis://file:6379".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		let env = ServerConfigLayer {
			cache: Some(CacheConfigLayer {
				redis_url: Some("redis://env:6379".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(env);

		let cache = base.cache.unwrap();
		assert_eq!(cache.backend, Some(CacheBackend::Redis));
		assert_eq!(cache.redis_url.as_deref(), Some("redis://env:6379"));
	}

	#[test]
	fn test_deserialize_full_file() {
		let toml_str = r#"
[http]
port = 9000

[cache]
backend = "redis"
redis_url = "redis://localhost:6379"

[stream]
topic = "custom:topic"
"#;
		let layer: ServerConfigLayer = toml::from_str(toml_str).unwrap();
		assert_eq!(layer.http.unwrap().port, Some(9000));
		assert_eq!(layer.cache.unwrap().backend, Some(CacheBackend::Redis));
		assert_eq!(layer.stream.unwrap().topic.as_deref(), Some("custom:topic"));
		assert!(layer.database.is_none());
	}
}
