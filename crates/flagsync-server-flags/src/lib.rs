// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server-side config sync and update propagation for flagsync.
//!
//! # Architecture
//!
//! - `repository` - Source-of-record reads (`FlagSource`) and authoring writes over SQLite
//! - `materialize` - Conversion of stored rows into evaluation-ready configs
//! - `cache` - Shared key/value cache (in-process or Redis)
//! - `store` - Cache-first config reads and API key resolution
//! - `bus` - Shared invalidation topic (in-process or Redis pub/sub)
//! - `propagator` - Per-environment fan-out to streaming clients
//! - `sync` - Write-then-notify change pipeline
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flagsync_server_flags::{
//!     ConfigStore, ConfigSync, LocalBus, MemoryCache, SqliteFlagSource, StoreConfig,
//!     UpdatePropagator,
//! };
//!
//! let store = Arc::new(ConfigStore::new(
//!     Arc::new(SqliteFlagSource::new(pool)),
//!     Arc::new(MemoryCache::new()),
//!     StoreConfig::default(),
//! ));
//! let propagator = Arc::new(UpdatePropagator::new(Arc::new(LocalBus::default())));
//! propagator.spawn(shutdown.clone());
//!
//! let sync = ConfigSync::new(store.clone(), propagator.clone());
//! sync.on_flag_changed("checkout.new_flow", environment_id).await?;
//! ```

pub mod bus;
pub mod cache;
pub mod error;
pub mod materialize;
pub mod propagator;
pub mod record;
pub mod repository;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use bus::{InvalidationBus, LocalBus, RedisBus, DEFAULT_TOPIC};
pub use cache::{MemoryCache, RedisCache, SharedCache};
pub use error::{FlagsServerError, Result};
pub use materialize::{materialize, Materialized};
pub use propagator::{
	PropagatorStats, SinkFrame, SinkId, Subscription, UpdatePropagator,
	DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_SINK_BUFFER,
};
pub use record::{
	ConditionRecord, FlagRecord, FlagStateRecord, RuleRecord, SplitRecord, VariationRecord,
};
pub use repository::{run_migrations, FlagSource, SqliteFlagSource};
pub use store::{ConfigStore, Refreshed, StoreConfig};
pub use sync::ConfigSync;

// Re-export core types for convenience
pub use flagsync_core::*;
