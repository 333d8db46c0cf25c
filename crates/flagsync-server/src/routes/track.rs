// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry ingestion. Both routes answer 202 before any processing happens.

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use flagsync_core::{EvaluationTelemetry, TrackedEvent};

use crate::api::AppState;
use crate::api_key::ApiKeyEnvironment;
use crate::ingest::IngestItem;

/// POST /track/evaluation
pub async fn track_evaluation(
	State(state): State<AppState>,
	ApiKeyEnvironment(identity): ApiKeyEnvironment,
	body: Bytes,
) -> StatusCode {
	let Some(telemetry) = parse::<EvaluationTelemetry>(&body, "evaluation") else {
		return StatusCode::ACCEPTED;
	};
	if let Err(e) = telemetry.validate() {
		warn!(error = %e, "Dropping incomplete evaluation telemetry");
		return StatusCode::ACCEPTED;
	}

	state.ingest.offer(IngestItem::Evaluation {
		environment_id: identity.environment_id,
		telemetry,
	});
	StatusCode::ACCEPTED
}

/// POST /track/event
pub async fn track_event(
	State(state): State<AppState>,
	ApiKeyEnvironment(identity): ApiKeyEnvironment,
	body: Bytes,
) -> StatusCode {
	let Some(event) = parse::<TrackedEvent>(&body, "event") else {
		return StatusCode::ACCEPTED;
	};
	if let Err(e) = event.validate() {
		warn!(error = %e, "Dropping incomplete tracked event");
		return StatusCode::ACCEPTED;
	}

	state.ingest.offer(IngestItem::Event {
		environment_id: identity.environment_id,
		event,
	});
	StatusCode::ACCEPTED
}

fn parse<T: DeserializeOwned>(body: &[u8], kind: &'static str) -> Option<T> {
	match serde_json::from_slice(body) {
		Ok(parsed) => Some(parsed),
		Err(e) => {
			warn!(kind, error = %e, "Dropping malformed telemetry payload");
			None
		}
	}
}
