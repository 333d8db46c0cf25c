// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	routing::{get, post},
	Router,
};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use flagsync_server_config::{CacheBackend, ServerConfig};
use flagsync_server_flags::{
	ConfigStore, ConfigSync, InvalidationBus, LocalBus, MemoryCache, RedisBus, RedisCache,
	SharedCache, SqliteFlagSource, StoreConfig, UpdatePropagator,
};

use crate::error::{Result, ServerError};
use crate::ingest::TelemetryIngest;
use crate::routes;

const BUS_CAPACITY: usize = 1024;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
	pub store: Arc<ConfigStore>,
	pub propagator: Arc<UpdatePropagator>,
	pub sync: ConfigSync,
	pub ingest: TelemetryIngest,
	pub config: Arc<ServerConfig>,
}

/// Builds the cache, bus and store for `config` and starts the background
/// tasks: the propagator's bus consumer, the heartbeat ticker and the telemetry
/// worker. All of them stop when `shutdown` is cancelled.
pub async fn create_app_state(
	pool: SqlitePool,
	config: &ServerConfig,
	shutdown: CancellationToken,
) -> Result<AppState> {
	let (cache, bus): (Arc<dyn SharedCache>, Arc<dyn InvalidationBus>) = match config.cache.backend {
		CacheBackend::Memory => (
			Arc::new(MemoryCache::new()),
			Arc::new(LocalBus::new(BUS_CAPACITY)),
		),
		CacheBackend::Redis => {
			let url = config.cache.redis_url.as_deref().ok_or_else(|| {
				ServerError::Internal("redis cache backend configured without a URL".to_string())
			})?;
			let cache = RedisCache::connect(url).await?;
			let bus = RedisBus::connect(url, &config.stream.topic, BUS_CAPACITY).await?;
			(Arc::new(cache), Arc::new(bus))
		}
	};

	let store = Arc::new(ConfigStore::new(
		Arc::new(SqliteFlagSource::new(pool)),
		cache,
		StoreConfig {
			api_key_ttl: Duration::from_secs(config.cache.api_key_ttl_secs),
			api_key_memo_capacity: config.cache.api_key_memo_capacity,
			api_key_memo_ttl: Duration::from_secs(config.cache.api_key_memo_ttl_secs),
		},
	));

	let propagator = Arc::new(UpdatePropagator::new(bus));
	propagator.spawn(shutdown.clone());
	propagator.spawn_heartbeat(
		Duration::from_secs(config.stream.heartbeat_interval_secs),
		shutdown.clone(),
	);

	let (ingest, worker) = TelemetryIngest::new(config.stream.ingest_queue_capacity);
	worker.spawn(shutdown);

	info!(
		cache_backend = %config.cache.backend,
		heartbeat_interval_secs = config.stream.heartbeat_interval_secs,
		"Application state ready"
	);

	Ok(AppState {
		sync: ConfigSync::new(Arc::clone(&store), Arc::clone(&propagator)),
		store,
		propagator,
		ingest,
		config: Arc::new(config.clone()),
	})
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/flag-config/all", get(routes::flag_config::get_all_configs))
		.route(
			"/flag-config/{flag_key}",
			get(routes::flag_config::get_config),
		)
		.route("/evaluate", post(routes::evaluate::evaluate_flag))
		.route("/stream", get(routes::stream::stream_flags))
		.route("/track/evaluation", post(routes::track::track_evaluation))
		.route("/track/event", post(routes::track::track_event))
		.with_state(state)
}
