// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server-sent event stream of flag changes.

use std::convert::Infallible;

use axum::{
	extract::State,
	response::sse::{Event, Sse},
};
use futures::Stream;
use tracing::{info, instrument, warn};

use flagsync_core::FlagStreamEvent;

use crate::api::AppState;
use crate::api_key::ApiKeyEnvironment;

/// GET /stream - Flag change notifications for the caller's environment.
///
/// Frames:
/// - `connected`: sent once on open, empty data
/// - `flag-update`: `{flagKey, changeType}`
/// - `: heartbeat` comment on the configured interval
///
/// The sink is registered before the response is returned and is removed when
/// the client goes away or stops keeping up.
#[instrument(skip(state, identity), fields(environment_id = %identity.environment_id))]
pub async fn stream_flags(
	State(state): State<AppState>,
	ApiKeyEnvironment(identity): ApiKeyEnvironment,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
	let environment_id = identity.environment_id;
	let (subscription, mut frames) = state
		.propagator
		.open_sink(environment_id, state.config.stream.sink_buffer);

	info!(
		environment_id = %environment_id,
		sink_id = subscription.id(),
		"Client connected to flag stream"
	);

	let stream = async_stream::stream! {
		// Dropped with the stream, which unregisters the sink.
		let _subscription = subscription;

		yield Ok(sse_event(&FlagStreamEvent::connected()));

		while let Some(frame) = frames.recv().await {
			match frame.to_stream_event() {
				Some(event) => yield Ok(sse_event(&event)),
				None => yield Ok(Event::default().comment("heartbeat")),
			}
		}

		info!(environment_id = %environment_id, "Flag stream closed by server");
	};

	Sse::new(stream)
}

fn sse_event(event: &FlagStreamEvent) -> Event {
	let data = event.data().unwrap_or_else(|e| {
		warn!(error = %e, "Failed to serialize stream event");
		String::new()
	});
	Event::default().event(event.event_type()).data(data)
}

#[cfg(test)]
mod tests {
	use super::*;
	use flagsync_core::ChangeType;
	use flagsync_server_flags::SinkFrame;

	#[test]
	fn test_heartbeat_frame_has_no_event() {
		assert!(SinkFrame::Heartbeat.to_stream_event().is_none());
	}

	#[test]
	fn test_update_frame_maps_to_flag_update() {
		let frame = SinkFrame::Update {
			flag_key: "banner".to_string(),
			change_type: ChangeType::Deleted,
		};
		let event = frame.to_stream_event().unwrap();
		assert_eq!(event.event_type(), "flag-update");
		assert_eq!(
			event.data().unwrap(),
			r#"{"flagKey":"banner","changeType":"deleted"}"#
		);
	}
}
