// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry dispatch for observed evaluations and custom events.
//!
//! The client hands each payload to a [`TelemetrySink`] on a spawned task and
//! never waits for it. Failures are logged by the client and not retried.

use std::sync::Arc;

use async_trait::async_trait;
use flagsync_core::{EvaluationTelemetry, TrackedEvent};
use reqwest::{Client, Url};
use serde::Serialize;

use crate::error::{FlagsError, Result};
use crate::fetch::{endpoint, status_error, API_KEY_HEADER};

#[async_trait]
pub trait TelemetrySink: Send + Sync + 'static {
	async fn send_evaluation(&self, telemetry: EvaluationTelemetry) -> Result<()>;

	async fn send_event(&self, event: TrackedEvent) -> Result<()>;
}

pub type SharedTelemetrySink = Arc<dyn TelemetrySink>;

/// Posts to `POST /track/evaluation` and `POST /track/event`.
#[derive(Debug, Clone)]
pub struct HttpTelemetrySink {
	http: Client,
	base_url: Url,
	api_key: String,
}

impl HttpTelemetrySink {
	pub fn new(http: Client, base_url: Url, api_key: impl Into<String>) -> Self {
		Self {
			http,
			base_url,
			api_key: api_key.into(),
		}
	}

	async fn post<T: Serialize + Sync>(&self, segment: &str, payload: &T) -> Result<()> {
		let response = self
			.http
			.post(endpoint(&self.base_url, &["track", segment])?)
			.header(API_KEY_HEADER, &self.api_key)
			.json(payload)
			.send()
			.await
			.map_err(FlagsError::from_reqwest)?;

		if !response.status().is_success() {
			return Err(status_error(response).await);
		}
		Ok(())
	}
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
	async fn send_evaluation(&self, telemetry: EvaluationTelemetry) -> Result<()> {
		self.post("evaluation", &telemetry).await
	}

	async fn send_event(&self, event: TrackedEvent) -> Result<()> {
		self.post("event", &event).await
	}
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTelemetrySink;

#[async_trait]
impl TelemetrySink for NoOpTelemetrySink {
	async fn send_evaluation(&self, _telemetry: EvaluationTelemetry) -> Result<()> {
		Ok(())
	}

	async fn send_event(&self, _event: TrackedEvent) -> Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use flagsync_core::{EvaluationContext, VariationValue};
	use wiremock::matchers::{body_partial_json, header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn sink(server: &MockServer) -> HttpTelemetrySink {
		HttpTelemetrySink::new(
			Client::new(),
			Url::parse(&server.uri()).unwrap(),
			"fs_test_key",
		)
	}

	#[tokio::test]
	async fn test_evaluation_is_posted() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/track/evaluation"))
			.and(header("x-api-key", "fs_test_key"))
			.and(body_partial_json(serde_json::json!({
				"flagKey": "banner",
				"variationId": "on",
				"value": true,
			})))
			.respond_with(ResponseTemplate::new(202))
			.expect(1)
			.mount(&server)
			.await;

		let telemetry = EvaluationTelemetry::new(
			"banner",
			"on",
			VariationValue::Bool(true),
			EvaluationContext::new().with_user_id("u1"),
		);
		sink(&server).send_evaluation(telemetry).await.unwrap();
	}

	#[tokio::test]
	async fn test_event_is_posted() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/track/event"))
			.and(body_partial_json(serde_json::json!({"event": "checkout"})))
			.respond_with(ResponseTemplate::new(202))
			.expect(1)
			.mount(&server)
			.await;

		let event = TrackedEvent::new("checkout", None, EvaluationContext::new());
		sink(&server).send_event(event).await.unwrap();
	}

	#[tokio::test]
	async fn test_rejection_is_an_error() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(500))
			.mount(&server)
			.await;

		let event = TrackedEvent::new("checkout", None, EvaluationContext::new());
		assert!(sink(&server).send_event(event).await.is_err());
	}

	#[tokio::test]
	async fn test_noop_sink_accepts_everything() {
		let event = TrackedEvent::new("checkout", None, EvaluationContext::new());
		assert!(NoOpTelemetrySink.send_event(event).await.is_ok());
	}
}
