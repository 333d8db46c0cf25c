// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for config fetch, evaluation, telemetry and health routes.

mod common;

use std::time::Duration;

use axum::{
	body::Body,
	http::{header, Request, StatusCode},
};
use common::{body_json, setup_test_app, API_KEY};
use flagsync_server_flags::RuleRecord;
use serde_json::json;

// ============================================================================
// Health and authentication
// ============================================================================

#[tokio::test]
async fn test_health_is_unauthenticated() {
	let app = setup_test_app().await;
	let response = app
		.send(Request::builder().uri("/health").body(Body::empty()).unwrap())
		.await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_missing_api_key_is_unauthorized() {
	let app = setup_test_app().await;
	let response = app
		.send(
			Request::builder()
				.uri("/flag-config/all")
				.body(Body::empty())
				.unwrap(),
		)
		.await;

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	let json = body_json(response).await;
	assert_eq!(json["error"], "unauthorized");
	assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_unknown_api_key_is_unauthorized_everywhere() {
	let app = setup_test_app().await;
	for (method, uri) in [
		("GET", "/flag-config/all"),
		("GET", "/flag-config/banner"),
		("POST", "/evaluate"),
		("GET", "/stream"),
		("POST", "/track/evaluation"),
		("POST", "/track/event"),
	] {
		let response = app
			.send(
				Request::builder()
					.method(method)
					.uri(uri)
					.header("x-api-key", "fs_nope")
					.header("content-type", "application/json")
					.body(Body::from("{}"))
					.unwrap(),
			)
			.await;
		assert_eq!(
			response.status(),
			StatusCode::UNAUTHORIZED,
			"{method} {uri} should reject an unknown key"
		);
	}
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
	let app = setup_test_app().await;
	let response = app
		.send(
			Request::builder()
				.uri("/flag-config/all")
				.header(header::AUTHORIZATION, format!("Bearer {API_KEY}"))
				.body(Body::empty())
				.unwrap(),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Config fetch
// ============================================================================

#[tokio::test]
async fn test_all_configs_with_cache_headers() {
	let app = setup_test_app().await;
	app.country_flag("checkout", "US").await;
	app.boolean_flag("unreleased").await;

	let response = app.get("/flag-config/all").await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get(header::CACHE_CONTROL).unwrap(),
		"public, max-age=60, stale-while-revalidate=30"
	);

	let json = body_json(response).await;
	let map = json.as_object().unwrap();
	assert_eq!(map.len(), 1, "flags without state are not served");
	assert_eq!(json["checkout"]["key"], "checkout");
	assert_eq!(json["checkout"]["enabled"], true);
	assert_eq!(json["checkout"]["defaultVariation"]["id"], "off");
}

#[tokio::test]
async fn test_single_config_and_absent_flag() {
	let app = setup_test_app().await;
	app.country_flag("checkout", "US").await;

	let response = app.get("/flag-config/checkout").await;
	assert_eq!(response.status(), StatusCode::OK);
	let json = body_json(response).await;
	assert_eq!(json["key"], "checkout");
	assert_eq!(json["rules"].as_array().unwrap().len(), 1);

	let response = app.get("/flag-config/missing").await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	assert_eq!(body_json(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_invalid_config_is_served_as_absent() {
	let app = setup_test_app().await;
	let flag_id = app.boolean_flag("broken").await;
	app.source
		.set_flag_state(flag_id, app.environment_id, true, "off")
		.await
		.unwrap();
	app.source
		.add_rule(
			flag_id,
			&RuleRecord {
				id: "ghost-target".to_string(),
				environment_id: app.environment_id,
				order: 0,
				kind: "targeting".to_string(),
				conditions: vec![],
				rollout_percentage: Some(100),
				target_variation_id: Some("ghost".to_string()),
				distribution: vec![],
			},
		)
		.await
		.unwrap();

	assert_eq!(
		app.get("/flag-config/broken").await.status(),
		StatusCode::NOT_FOUND
	);
	let all = body_json(app.get("/flag-config/all").await).await;
	assert!(all.get("broken").is_none());
}

// ============================================================================
// Evaluation
// ============================================================================

#[tokio::test]
async fn test_evaluate_matches_targeting_rule() {
	let app = setup_test_app().await;
	app.country_flag("checkout", "US").await;

	let response = app
		.post_json(
			"/evaluate",
			json!({"flagKey": "checkout", "context": {"userId": "u1", "user": {"country": "US"}}}),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		body_json(response).await,
		json!({"enabled": true, "value": true})
	);

	let response = app
		.post_json(
			"/evaluate",
			json!({"flagKey": "checkout", "context": {"userId": "u2", "user": {"country": "DE"}}}),
		)
		.await;
	assert_eq!(
		body_json(response).await,
		json!({"enabled": true, "value": false})
	);
}

#[tokio::test]
async fn test_evaluate_absent_flag() {
	let app = setup_test_app().await;
	let response = app
		.post_json("/evaluate", json!({"flagKey": "nope", "context": {}}))
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		body_json(response).await,
		json!({"enabled": false, "value": null})
	);
}

#[tokio::test]
async fn test_evaluate_disabled_flag_serves_default() {
	let app = setup_test_app().await;
	let flag_id = app.country_flag("checkout", "US").await;
	app.source
		.set_flag_state(flag_id, app.environment_id, false, "off")
		.await
		.unwrap();

	let response = app
		.post_json(
			"/evaluate",
			json!({"flagKey": "checkout", "context": {"user": {"country": "US"}}}),
		)
		.await;
	assert_eq!(
		body_json(response).await,
		json!({"enabled": false, "value": false})
	);
}

#[tokio::test]
async fn test_evaluate_requires_flag_key() {
	let app = setup_test_app().await;
	let response = app
		.post_json("/evaluate", json!({"flagKey": "  "}))
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Telemetry
// ============================================================================

async fn wait_for_processed(app: &common::TestApp, expected: u64) {
	tokio::time::timeout(Duration::from_secs(2), async {
		while app.state.ingest.stats().processed < expected {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap();
}

#[tokio::test]
async fn test_track_evaluation_is_accepted_and_ingested() {
	let app = setup_test_app().await;
	let response = app
		.post_json(
			"/track/evaluation",
			json!({
				"flagKey": "checkout",
				"variationId": "on",
				"value": true,
				"context": {"userId": "u1"},
				"timestamp": "2025-01-01T00:00:00Z"
			}),
		)
		.await;

	assert_eq!(response.status(), StatusCode::ACCEPTED);
	wait_for_processed(&app, 1).await;
	assert_eq!(app.state.ingest.stats().accepted, 1);
}

#[tokio::test]
async fn test_track_event_is_accepted_and_ingested() {
	let app = setup_test_app().await;
	let response = app
		.post_json(
			"/track/event",
			json!({
				"event": "purchase",
				"properties": {"amount": 42},
				"timestamp": "2025-01-01T00:00:00Z"
			}),
		)
		.await;

	assert_eq!(response.status(), StatusCode::ACCEPTED);
	wait_for_processed(&app, 1).await;
}

#[tokio::test]
async fn test_malformed_telemetry_is_accepted_but_dropped() {
	let app = setup_test_app().await;

	let malformed = app
		.send(
			Request::builder()
				.method("POST")
				.uri("/track/evaluation")
				.header("x-api-key", API_KEY)
				.body(Body::from("not json"))
				.unwrap(),
		)
		.await;
	assert_eq!(malformed.status(), StatusCode::ACCEPTED);

	let incomplete = app
		.post_json(
			"/track/event",
			json!({"event": "", "timestamp": "2025-01-01T00:00:00Z"}),
		)
		.await;
	assert_eq!(incomplete.status(), StatusCode::ACCEPTED);

	let stats = app.state.ingest.stats();
	assert_eq!(stats.accepted, 0);
	assert_eq!(stats.dropped, 0);
}
