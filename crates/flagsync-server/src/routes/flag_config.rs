// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Config fetch routes used by SDKs for bulk load and single-flag refetch.

use std::collections::BTreeMap;

use axum::{
	extract::{Path, State},
	http::header,
	response::IntoResponse,
	Json,
};
use tracing::instrument;

use flagsync_core::FlagConfig;

use crate::api::AppState;
use crate::api_key::ApiKeyEnvironment;
use crate::error::{Result, ServerError};

/// Browsers and CDNs may reuse a bulk response briefly; stream updates cover the gap.
pub const CONFIG_CACHE_CONTROL: &str = "public, max-age=60, stale-while-revalidate=30";

/// GET /flag-config/all - Every servable flag in the caller's environment.
#[instrument(skip(state, identity), fields(environment_id = %identity.environment_id))]
pub async fn get_all_configs(
	State(state): State<AppState>,
	ApiKeyEnvironment(identity): ApiKeyEnvironment,
) -> Result<impl IntoResponse> {
	let configs: BTreeMap<String, FlagConfig> =
		state.store.get_all(identity.environment_id).await?;

	tracing::debug!(count = configs.len(), "Serving bulk flag configs");
	Ok((
		[(header::CACHE_CONTROL, CONFIG_CACHE_CONTROL)],
		Json(configs),
	))
}

/// GET /flag-config/{flag_key} - One flag, or 404 when absent or invalid.
#[instrument(skip(state, identity), fields(environment_id = %identity.environment_id))]
pub async fn get_config(
	State(state): State<AppState>,
	ApiKeyEnvironment(identity): ApiKeyEnvironment,
	Path(flag_key): Path<String>,
) -> Result<Json<FlagConfig>> {
	let config = state.store.get(&flag_key, identity.environment_id).await?;
	match config {
		Some(config) => Ok(Json(config)),
		None => Err(ServerError::NotFound(flag_key)),
	}
}
