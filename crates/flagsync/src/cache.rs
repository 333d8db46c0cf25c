// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Local in-memory copy of an environment's flag configs.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flagsync_core::FlagConfig;
use tokio::sync::RwLock;

/// Flag configs held by one client instance.
///
/// Entries are replaced whole, never patched. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct FlagCache {
	flags: Arc<RwLock<HashMap<String, Arc<FlagConfig>>>>,
	initialized: Arc<AtomicBool>,
}

impl FlagCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the whole map with a bulk fetch result.
	///
	/// Returns every key present before or after the swap.
	pub async fn replace_all(&self, configs: HashMap<String, FlagConfig>) -> Vec<String> {
		let next: HashMap<String, Arc<FlagConfig>> = configs
			.into_iter()
			.map(|(key, config)| (key, Arc::new(config)))
			.collect();

		let mut flags = self.flags.write().await;
		let touched: BTreeSet<String> = flags.keys().chain(next.keys()).cloned().collect();
		*flags = next;
		self.initialized.store(true, Ordering::SeqCst);

		touched.into_iter().collect()
	}

	pub async fn get(&self, flag_key: &str) -> Option<Arc<FlagConfig>> {
		self.flags.read().await.get(flag_key).cloned()
	}

	pub async fn upsert(&self, config: FlagConfig) {
		self
			.flags
			.write()
			.await
			.insert(config.key.clone(), Arc::new(config));
	}

	/// Removes a flag. Returns whether it was present.
	pub async fn remove(&self, flag_key: &str) -> bool {
		self.flags.write().await.remove(flag_key).is_some()
	}

	pub async fn keys(&self) -> Vec<String> {
		let mut keys: Vec<String> = self.flags.read().await.keys().cloned().collect();
		keys.sort();
		keys
	}

	/// Snapshot of the current map.
	pub async fn snapshot(&self) -> HashMap<String, FlagConfig> {
		self
			.flags
			.read()
			.await
			.iter()
			.map(|(key, config)| (key.clone(), config.as_ref().clone()))
			.collect()
	}

	pub async fn len(&self) -> usize {
		self.flags.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.flags.read().await.is_empty()
	}

	/// Whether a bulk fetch has been applied since creation or the last clear.
	pub fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::SeqCst)
	}

	pub async fn clear(&self) {
		self.flags.write().await.clear();
		self.initialized.store(false, Ordering::SeqCst);
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use serde_json::json;

	pub(crate) fn boolean_config(key: &str, enabled: bool) -> FlagConfig {
		serde_json::from_value(json!({
			"key": key,
			"enabled": enabled,
			"defaultVariation": {"id": "off", "name": "Off", "value": false, "type": "boolean"},
			"variations": [
				{"id": "off", "name": "Off", "value": false, "type": "boolean"},
				{"id": "on", "name": "On", "value": true, "type": "boolean"}
			],
			"rules": []
		}))
		.unwrap()
	}

	#[tokio::test]
	async fn test_replace_all_reports_touched_keys() {
		let cache = FlagCache::new();
		assert!(!cache.is_initialized());

		cache
			.replace_all(HashMap::from([
				("a".to_string(), boolean_config("a", true)),
				("b".to_string(), boolean_config("b", true)),
			]))
			.await;
		assert!(cache.is_initialized());

		let touched = cache
			.replace_all(HashMap::from([
				("b".to_string(), boolean_config("b", false)),
				("c".to_string(), boolean_config("c", true)),
			]))
			.await;

		assert_eq!(touched, vec!["a", "b", "c"]);
		assert_eq!(cache.keys().await, vec!["b", "c"]);
		assert!(!cache.get("b").await.unwrap().enabled);
	}

	#[tokio::test]
	async fn test_upsert_replaces_whole_entry() {
		let cache = FlagCache::new();
		cache.upsert(boolean_config("banner", true)).await;

		let mut replacement = boolean_config("banner", false);
		replacement.variations.truncate(1);
		cache.upsert(replacement.clone()).await;

		assert_eq!(cache.get("banner").await.unwrap().as_ref(), &replacement);
		assert_eq!(cache.len().await, 1);
	}

	#[tokio::test]
	async fn test_remove_and_clear() {
		let cache = FlagCache::new();
		cache
			.replace_all(HashMap::from([(
				"banner".to_string(),
				boolean_config("banner", true),
			)]))
			.await;

		assert!(cache.remove("banner").await);
		assert!(!cache.remove("banner").await);

		cache.upsert(boolean_config("other", true)).await;
		cache.clear().await;
		assert!(cache.is_empty().await);
		assert!(!cache.is_initialized());
	}

	#[tokio::test]
	async fn test_clones_share_state() {
		let cache = FlagCache::new();
		let other = cache.clone();
		cache.upsert(boolean_config("shared", true)).await;
		assert!(other.get("shared").await.is_some());
	}
}
