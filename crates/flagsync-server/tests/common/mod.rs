// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use axum::{
	body::Body,
	http::{Request, Response},
	Router,
};
use flagsync_core::{EnvironmentId, FlagId, ProjectId};
use flagsync_server::{create_app_state, create_router, AppState, ServerConfig};
use flagsync_server_flags::{ConditionRecord, RuleRecord, SqliteFlagSource, VariationRecord};
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const API_KEY: &str = "fs_test_production";

pub struct TestApp {
	pub router: Router,
	pub state: AppState,
	pub source: SqliteFlagSource,
	pub project_id: ProjectId,
	pub environment_id: EnvironmentId,
	pub shutdown: CancellationToken,
	_dir: TempDir,
}

impl Drop for TestApp {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

/// Creates a test app with an isolated, migrated database holding one project,
/// one environment and one API key.
pub async fn setup_test_app() -> TestApp {
	setup_test_app_with(ServerConfig::default()).await
}

pub async fn setup_test_app_with(config: ServerConfig) -> TestApp {
	let dir = tempdir().unwrap();
	let db_path = dir.path().join("test_flagsync.db");
	let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
	let pool = flagsync_server::db::create_pool(&db_url).await.unwrap();
	flagsync_server::db::run_migrations(&pool).await.unwrap();

	let source = SqliteFlagSource::new(pool.clone());
	let project_id = source.create_project("acme").await.unwrap();
	let environment_id = source
		.create_environment(project_id, "production")
		.await
		.unwrap();
	source.create_api_key(environment_id, API_KEY).await.unwrap();

	let shutdown = CancellationToken::new();
	let state = create_app_state(pool, &config, shutdown.clone())
		.await
		.unwrap();

	TestApp {
		router: create_router(state.clone()),
		state,
		source,
		project_id,
		environment_id,
		shutdown,
		_dir: dir,
	}
}

impl TestApp {
	pub async fn send(&self, request: Request<Body>) -> Response<Body> {
		self.router.clone().oneshot(request).await.unwrap()
	}

	pub async fn get(&self, uri: &str) -> Response<Body> {
		self.send(
			Request::builder()
				.uri(uri)
				.header("x-api-key", API_KEY)
				.body(Body::empty())
				.unwrap(),
		)
		.await
	}

	pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
		self.send(
			Request::builder()
				.method("POST")
				.uri(uri)
				.header("x-api-key", API_KEY)
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
		)
		.await
	}

	/// Creates a boolean flag with variations `off` and `on`.
	pub async fn boolean_flag(&self, key: &str) -> FlagId {
		let variations = [
			VariationRecord {
				id: "off".to_string(),
				name: "Off".to_string(),
				value: "false".to_string(),
				value_type: "boolean".to_string(),
			},
			VariationRecord {
				id: "on".to_string(),
				name: "On".to_string(),
				value: "true".to_string(),
				value_type: "boolean".to_string(),
			},
		];
		self.source
			.create_flag(self.project_id, key, &variations)
			.await
			.unwrap()
	}

	/// Flag serving `on` to users whose `user.country` equals `country`.
	pub async fn country_flag(&self, key: &str, country: &str) -> FlagId {
		let flag_id = self.boolean_flag(key).await;
		self.source
			.set_flag_state(flag_id, self.environment_id, true, "off")
			.await
			.unwrap();
		self.source
			.add_rule(
				flag_id,
				&RuleRecord {
					id: format!("{key}-country"),
					environment_id: self.environment_id,
					order: 0,
					kind: "targeting".to_string(),
					conditions: vec![ConditionRecord {
						attribute: "user.country".to_string(),
						operator: "equals".to_string(),
						value: country.to_string(),
					}],
					rollout_percentage: Some(100),
					target_variation_id: Some("on".to_string()),
					distribution: vec![],
				},
			)
			.await
			.unwrap();
		flag_id
	}
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
	let body = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	serde_json::from_slice(&body).unwrap()
}
