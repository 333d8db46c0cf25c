// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared key/value cache holding materialized configs and API key identities.
//!
//! Values are opaque JSON strings. Every write replaces the whole value.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::info;

use crate::error::Result;

#[async_trait]
pub trait SharedCache: Send + Sync {
	async fn get(&self, key: &str) -> Result<Option<String>>;

	/// Reads many keys in one round trip. The result is positionally aligned with `keys`.
	async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

	async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

	async fn delete(&self, key: &str) -> Result<()>;
}

struct Entry {
	value: String,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.map_or(true, |at| now < at)
	}
}

/// Process-local cache for single-node deployments and tests.
#[derive(Clone, Default)]
pub struct MemoryCache {
	entries: Arc<DashMap<String, Entry>>,
}

impl MemoryCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	fn read(&self, key: &str) -> Option<String> {
		let now = Instant::now();
		let hit = self
			.entries
			.get(key)
			.map(|entry| entry.is_live(now).then(|| entry.value.clone()));

		match hit {
			Some(Some(value)) => Some(value),
			Some(None) => {
				self.entries.remove_if(key, |_, entry| !entry.is_live(now));
				None
			}
			None => None,
		}
	}
}

#[async_trait]
impl SharedCache for MemoryCache {
	async fn get(&self, key: &str) -> Result<Option<String>> {
		Ok(self.read(key))
	}

	async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
		Ok(keys.iter().map(|k| self.read(k)).collect())
	}

	async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
		let expires_at = ttl.map(|ttl| Instant::now() + ttl);
		self.entries
			.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<()> {
		self.entries.remove(key);
		Ok(())
	}
}

/// Redis-backed cache shared by every server process.
#[derive(Clone)]
pub struct RedisCache {
	connection: ConnectionManager,
}

impl RedisCache {
	pub async fn connect(url: &str) -> Result<Self> {
		let client = Client::open(url)?;
		let connection = ConnectionManager::new(client).await?;
		info!("Connected to Redis cache");
		Ok(Self { connection })
	}

	pub fn from_connection(connection: ConnectionManager) -> Self {
		Self { connection }
	}
}

#[async_trait]
impl SharedCache for RedisCache {
	async fn get(&self, key: &str) -> Result<Option<String>> {
		let mut conn = self.connection.clone();
		let value: Option<String> = conn.get(key).await?;
		Ok(value)
	}

	async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
		if keys.is_empty() {
			return Ok(Vec::new());
		}
		let mut conn = self.connection.clone();
		let values: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
		Ok(values)
	}

	async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
		let mut conn = self.connection.clone();
		match ttl {
			Some(ttl) => {
				let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
			}
			None => {
				let _: () = conn.set(key, value).await?;
			}
		}
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<()> {
		let mut conn = self.connection.clone();
		let _: () = conn.del(key).await?;
		Ok(())
	}
}
