// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config store: cache-first reads of materialized flag configs.
//!
//! ```text
//!   get(key, env) ──► cache "config:{env}:{key}" ──hit──► FlagConfig
//!                         │ miss / undecodable
//!                         ▼
//!                  FlagSource::load_flag ──► materialize ──valid──► cache.set ──► FlagConfig
//!                                                 │ invalid / not configured
//!                                                 ▼
//!                                           cache.delete ──► None
//! ```
//!
//! The cache only ever holds valid configs. Concurrent misses for the same key
//! each recompute and write the same value; the last writer wins.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::{debug, instrument, warn};

use flagsync_core::{
	api_key_cache_key, config_cache_key, EnvironmentId, EnvironmentIdentity, FlagConfig,
	API_KEY_TTL_SECS,
};

use crate::cache::SharedCache;
use crate::error::{FlagsServerError, Result};
use crate::materialize::{materialize, Materialized};
use crate::repository::FlagSource;

const DEFAULT_MEMO_CAPACITY: usize = 1024;
const DEFAULT_MEMO_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct StoreConfig {
	/// Expiry of `api_key:*` entries in the shared cache.
	pub api_key_ttl: Duration,
	/// Maximum API keys held in the process-local memo.
	pub api_key_memo_capacity: usize,
	/// Lifetime of a memo entry, capped at `api_key_ttl`.
	pub api_key_memo_ttl: Duration,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			api_key_ttl: Duration::from_secs(API_KEY_TTL_SECS),
			api_key_memo_capacity: DEFAULT_MEMO_CAPACITY,
			api_key_memo_ttl: DEFAULT_MEMO_TTL,
		}
	}
}

/// Result of recomputing a flag from the source of record.
#[derive(Debug, Clone, PartialEq)]
pub enum Refreshed {
	/// A valid config was written to the cache.
	Written(FlagConfig),
	/// The flag is absent or invalid; its cache entry was deleted.
	Deleted,
}

/// Bounded API key memo. Entries expire after `ttl`; eviction is least-recently-used.
struct ApiKeyMemo {
	ttl: Duration,
	entries: Option<Mutex<LruCache<String, MemoEntry>>>,
}

#[derive(Clone, Copy)]
struct MemoEntry {
	identity: EnvironmentIdentity,
	expires_at: Instant,
}

impl ApiKeyMemo {
	/// A capacity of zero disables the memo.
	fn new(capacity: usize, ttl: Duration) -> Self {
		Self {
			ttl,
			entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
		}
	}

	fn lock(&self) -> Option<MutexGuard<'_, LruCache<String, MemoEntry>>> {
		self.entries
			.as_ref()
			.map(|entries| entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
	}

	fn get(&self, api_key: &str) -> Option<EnvironmentIdentity> {
		let mut entries = self.lock()?;
		let entry = entries.get(api_key).copied()?;
		if entry.expires_at <= Instant::now() {
			entries.pop(api_key);
			return None;
		}
		Some(entry.identity)
	}

	fn insert(&self, api_key: &str, identity: EnvironmentIdentity) {
		if let Some(mut entries) = self.lock() {
			entries.put(
				api_key.to_string(),
				MemoEntry {
					identity,
					expires_at: Instant::now() + self.ttl,
				},
			);
		}
	}

	fn remove(&self, api_key: &str) {
		if let Some(mut entries) = self.lock() {
			entries.pop(api_key);
		}
	}

	fn len(&self) -> usize {
		self.lock().map_or(0, |entries| entries.len())
	}

	#[cfg(test)]
	fn contains(&self, api_key: &str) -> bool {
		self.lock().is_some_and(|entries| entries.contains(api_key))
	}
}

pub struct ConfigStore {
	source: Arc<dyn FlagSource>,
	cache: Arc<dyn SharedCache>,
	memo: ApiKeyMemo,
	api_key_ttl: Duration,
}

impl ConfigStore {
	pub fn new(source: Arc<dyn FlagSource>, cache: Arc<dyn SharedCache>, config: StoreConfig) -> Self {
		Self {
			source,
			cache,
			memo: ApiKeyMemo::new(
				config.api_key_memo_capacity,
				config.api_key_memo_ttl.min(config.api_key_ttl),
			),
			api_key_ttl: config.api_key_ttl,
		}
	}

	pub fn source(&self) -> &Arc<dyn FlagSource> {
		&self.source
	}

	/// Returns the servable config of a flag, or `None` if it is absent or invalid.
	#[instrument(skip(self), fields(flag_key = %flag_key, environment_id = %environment_id))]
	pub async fn get(&self, flag_key: &str, environment_id: EnvironmentId) -> Result<Option<FlagConfig>> {
		let key = config_cache_key(environment_id, flag_key);

		if let Some(raw) = self.cache.get(&key).await? {
			match serde_json::from_str::<FlagConfig>(&raw) {
				Ok(config) => {
					debug!("config cache hit");
					return Ok(Some(config));
				}
				Err(e) => warn!(error = %e, "Discarding undecodable cache entry"),
			}
		} else {
			debug!("config cache miss");
		}

		match self.refresh(flag_key, environment_id).await? {
			Refreshed::Written(config) => Ok(Some(config)),
			Refreshed::Deleted => Ok(None),
		}
	}

	/// Returns every servable config in the environment, keyed by flag key.
	///
	/// The cache is read in one batch; each miss is repaired individually by
	/// `refresh`, which overwrites or deletes the entry.
	#[instrument(skip(self), fields(environment_id = %environment_id))]
	pub async fn get_all(&self, environment_id: EnvironmentId) -> Result<BTreeMap<String, FlagConfig>> {
		let flag_keys = self.source.list_flag_keys(environment_id).await?;
		let cache_keys: Vec<String> = flag_keys
			.iter()
			.map(|k| config_cache_key(environment_id, k))
			.collect();

		let cached = self.cache.get_many(&cache_keys).await?;

		let mut configs = BTreeMap::new();
		let mut misses = 0usize;
		for (flag_key, raw) in flag_keys.iter().zip(cached) {
			let hit = raw.and_then(|raw| match serde_json::from_str::<FlagConfig>(&raw) {
				Ok(config) => Some(config),
				Err(e) => {
					warn!(flag_key = %flag_key, error = %e, "Discarding undecodable cache entry");
					None
				}
			});

			let config = match hit {
				Some(config) => Some(config),
				None => {
					misses += 1;
					match self.refresh(flag_key, environment_id).await? {
						Refreshed::Written(config) => Some(config),
						Refreshed::Deleted => None,
					}
				}
			};

			if let Some(config) = config {
				configs.insert(flag_key.clone(), config);
			}
		}

		debug!(
			flags = flag_keys.len(),
			misses,
			served = configs.len(),
			"bulk config read"
		);
		Ok(configs)
	}

	/// Recomputes a flag from the source of record and replaces or deletes its cache entry.
	#[instrument(skip(self), fields(flag_key = %flag_key, environment_id = %environment_id))]
	pub async fn refresh(&self, flag_key: &str, environment_id: EnvironmentId) -> Result<Refreshed> {
		let key = config_cache_key(environment_id, flag_key);

		let materialized = match self.source.load_flag(environment_id, flag_key).await? {
			Some(record) => materialize(&record, environment_id),
			None => Materialized::NotConfigured,
		};

		match materialized {
			Materialized::Config(config) => {
				let raw = serde_json::to_string(&config)?;
				self.cache.set(&key, raw, None).await?;
				debug!("config cache written");
				Ok(Refreshed::Written(config))
			}
			Materialized::NotConfigured => {
				self.cache.delete(&key).await?;
				debug!("flag not configured in environment");
				Ok(Refreshed::Deleted)
			}
			Materialized::Invalid(reason) => {
				self.cache.delete(&key).await?;
				warn!(reason = %reason, "Flag config is invalid; serving as absent");
				Ok(Refreshed::Deleted)
			}
		}
	}

	/// Resolves an API key to its environment.
	///
	/// Lookup order is the process memo, then the shared cache, then the source
	/// of record. A source hit populates both tiers. Unknown keys are an error.
	#[instrument(skip(self, api_key))]
	pub async fn resolve_environment(&self, api_key: &str) -> Result<EnvironmentIdentity> {
		if let Some(identity) = self.memo.get(api_key) {
			return Ok(identity);
		}

		let cache_key = api_key_cache_key(api_key);
		if let Some(raw) = self.cache.get(&cache_key).await? {
			match serde_json::from_str::<EnvironmentIdentity>(&raw) {
				Ok(identity) => {
					debug!(environment_id = %identity.environment_id, "api key cache hit");
					self.memo.insert(api_key, identity);
					return Ok(identity);
				}
				Err(e) => {
					warn!(error = %e, "Discarding undecodable api key cache entry");
					self.cache.delete(&cache_key).await?;
				}
			}
		}

		let identity = self
			.source
			.resolve_api_key(api_key)
			.await?
			.ok_or(FlagsServerError::InvalidApiKey)?;

		self.cache
			.set(
				&cache_key,
				serde_json::to_string(&identity)?,
				Some(self.api_key_ttl),
			)
			.await?;
		self.memo.insert(api_key, identity);

		debug!(environment_id = %identity.environment_id, "api key resolved from source");
		Ok(identity)
	}

	/// Drops an API key from both lookup tiers, e.g. after revocation.
	pub async fn forget_api_key(&self, api_key: &str) -> Result<()> {
		self.memo.remove(api_key);
		self.cache.delete(&api_key_cache_key(api_key)).await
	}

	pub fn memoized_api_keys(&self) -> usize {
		self.memo.len()
	}
}
