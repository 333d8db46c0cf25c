// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for the server-sent flag change stream.

mod common;

use std::time::Duration;

use axum::{
	body::{Body, Bytes},
	http::StatusCode,
};
use common::{setup_test_app, setup_test_app_with};
use flagsync_core::ChangeType;
use flagsync_server::ServerConfig;
use futures::{Stream, StreamExt};

async fn next_chunk<S>(body: &mut S) -> String
where
	S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
{
	let chunk = tokio::time::timeout(Duration::from_secs(3), body.next())
		.await
		.expect("timed out waiting for stream frame")
		.expect("stream ended")
		.expect("stream error");
	String::from_utf8(chunk.to_vec()).unwrap()
}

async fn open_stream(app: &common::TestApp) -> impl Stream<Item = Result<Bytes, axum::Error>> + Unpin {
	let response = app.get("/stream").await;
	assert_eq!(response.status(), StatusCode::OK);
	assert!(response
		.headers()
		.get("content-type")
		.and_then(|v| v.to_str().ok())
		.unwrap_or("")
		.starts_with("text/event-stream"));
	Body::into_data_stream(response.into_body())
}

#[tokio::test]
async fn test_stream_opens_with_connected_frame() {
	let app = setup_test_app().await;
	let mut body = open_stream(&app).await;

	let first = next_chunk(&mut body).await;
	assert!(first.contains("event: connected"), "got {first:?}");
	assert_eq!(app.state.propagator.sink_count_for(app.environment_id), 1);
}

#[tokio::test]
async fn test_flag_change_reaches_stream() {
	let app = setup_test_app().await;
	let flag_id = app.country_flag("checkout", "US").await;
	let mut body = open_stream(&app).await;
	next_chunk(&mut body).await;

	app.source
		.set_flag_state(flag_id, app.environment_id, false, "off")
		.await
		.unwrap();
	let change = app
		.state
		.sync
		.on_flag_changed("checkout", app.environment_id)
		.await
		.unwrap();
	assert_eq!(change, ChangeType::Updated);

	let frame = next_chunk(&mut body).await;
	assert!(frame.contains("event: flag-update"), "got {frame:?}");
	assert!(frame.contains(r#""flagKey":"checkout""#));
	assert!(frame.contains(r#""changeType":"updated""#));

	// A refetch after the notification sees the new value.
	let config = app
		.state
		.store
		.get("checkout", app.environment_id)
		.await
		.unwrap()
		.unwrap();
	assert!(!config.enabled);
}

#[tokio::test]
async fn test_deletion_reaches_stream() {
	let app = setup_test_app().await;
	let flag_id = app.country_flag("checkout", "US").await;
	let mut body = open_stream(&app).await;
	next_chunk(&mut body).await;

	app.source
		.clear_flag_state(flag_id, app.environment_id)
		.await
		.unwrap();
	app.state
		.sync
		.on_flag_changed("checkout", app.environment_id)
		.await
		.unwrap();

	let frame = next_chunk(&mut body).await;
	assert!(frame.contains(r#""changeType":"deleted""#), "got {frame:?}");
}

#[tokio::test]
async fn test_other_environment_changes_are_not_delivered() {
	let app = setup_test_app().await;
	let staging = app
		.source
		.create_environment(app.project_id, "staging")
		.await
		.unwrap();
	let flag_id = app.boolean_flag("checkout").await;
	app.source
		.set_flag_state(flag_id, staging, true, "on")
		.await
		.unwrap();

	let mut body = open_stream(&app).await;
	next_chunk(&mut body).await;

	app.state
		.sync
		.on_flag_changed("checkout", staging)
		.await
		.unwrap();

	let nothing = tokio::time::timeout(Duration::from_millis(200), body.next()).await;
	assert!(nothing.is_err(), "production stream received a staging change");
}

#[tokio::test]
async fn test_disconnect_removes_sink() {
	let app = setup_test_app().await;
	let mut body = open_stream(&app).await;
	next_chunk(&mut body).await;
	assert_eq!(app.state.propagator.sink_count_for(app.environment_id), 1);

	drop(body);
	assert_eq!(app.state.propagator.sink_count_for(app.environment_id), 0);
}

#[tokio::test]
async fn test_heartbeat_comment_frames() {
	let mut config = ServerConfig::default();
	config.stream.heartbeat_interval_secs = 1;
	let app = setup_test_app_with(config).await;

	let mut body = open_stream(&app).await;
	next_chunk(&mut body).await;

	let frame = next_chunk(&mut body).await;
	assert!(frame.starts_with(": heartbeat"), "got {frame:?}");
}
