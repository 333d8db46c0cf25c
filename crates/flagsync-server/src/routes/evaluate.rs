// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server-side evaluation for integrations that do not embed an SDK.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use flagsync_core::{evaluate, EvaluationContext, VariationValue};

use crate::api::AppState;
use crate::api_key::ApiKeyEnvironment;
use crate::error::{Result, ServerError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
	pub flag_key: String,
	#[serde(default)]
	pub context: EvaluationContext,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EvaluateResponse {
	pub enabled: bool,
	pub value: Option<VariationValue>,
}

/// POST /evaluate - Resolves one flag for the posted context.
///
/// An absent or invalid flag answers `{enabled: false, value: null}`.
#[instrument(
	skip(state, identity, request),
	fields(environment_id = %identity.environment_id, flag_key = %request.flag_key)
)]
pub async fn evaluate_flag(
	State(state): State<AppState>,
	ApiKeyEnvironment(identity): ApiKeyEnvironment,
	Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>> {
	if request.flag_key.trim().is_empty() {
		return Err(ServerError::BadRequest("flagKey is required".to_string()));
	}

	let response = match state
		.store
		.get(&request.flag_key, identity.environment_id)
		.await?
	{
		Some(config) => EvaluateResponse {
			enabled: config.enabled,
			value: Some(evaluate(&config, &request.context).value.clone()),
		},
		None => EvaluateResponse {
			enabled: false,
			value: None,
		},
	};

	Ok(Json(response))
}
