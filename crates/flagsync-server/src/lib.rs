// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP surface of flagsync.
//!
//! SDK-facing routes authenticate with an environment API key:
//!
//! - `GET /flag-config/all`, `GET /flag-config/{flagKey}` - config fetch
//! - `POST /evaluate` - server-side evaluation
//! - `GET /stream` - server-sent change notifications
//! - `POST /track/evaluation`, `POST /track/event` - telemetry ingestion
//!
//! `GET /health` is unauthenticated.

pub mod api;
pub mod api_key;
pub mod db;
pub mod error;
pub mod ingest;
pub mod routes;
pub mod version;

pub use api::{create_app_state, create_router, AppState};
pub use error::{ErrorResponse, Result, ServerError};
pub use flagsync_server_config::ServerConfig;
