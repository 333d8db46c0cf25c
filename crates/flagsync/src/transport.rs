// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming transport for flag change notifications.
//!
//! A transport turns one connection attempt into a stream of [`TransportEvent`]s.
//! `Open` is yielded once the server has accepted the connection; the stream ends
//! after an `Error` or when the server closes it. Reconnecting is the caller's job.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, ACCEPT, CACHE_CONTROL};
use reqwest::{Client, Url};
use tracing::{debug, info};

use crate::fetch::status_error;

/// One observation from a streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	/// The server accepted the connection.
	Open,
	/// A named event with its data field.
	Event { event_type: String, data: String },
	/// The connection failed or broke.
	Error(String),
}

pub type TransportStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

pub trait StreamTransport: Send + Sync + 'static {
	fn open(&self, url: Url, headers: HeaderMap) -> TransportStream;
}

/// Server-sent events over reqwest.
#[derive(Debug, Clone)]
pub struct SseTransport {
	http: Client,
}

impl SseTransport {
	/// `http` must not carry a total request timeout, or the stream is cut off.
	pub fn new(http: Client) -> Self {
		Self { http }
	}
}

impl StreamTransport for SseTransport {
	fn open(&self, url: Url, headers: HeaderMap) -> TransportStream {
		let request = self
			.http
			.get(url.clone())
			.headers(headers)
			.header(ACCEPT, "text/event-stream")
			.header(CACHE_CONTROL, "no-cache");

		Box::pin(async_stream::stream! {
			info!(url = %url, "Connecting to flag stream");

			let response = match request.send().await {
				Ok(response) => response,
				Err(e) => {
					yield TransportEvent::Error(e.to_string());
					return;
				}
			};

			if !response.status().is_success() {
				yield TransportEvent::Error(status_error(response).await.to_string());
				return;
			}

			yield TransportEvent::Open;

			let mut events = response.bytes_stream().eventsource();
			while let Some(item) = events.next().await {
				match item {
					Ok(event) => {
						yield TransportEvent::Event {
							event_type: event.event,
							data: event.data,
						};
					}
					Err(e) => {
						yield TransportEvent::Error(e.to_string());
						return;
					}
				}
			}

			debug!("Flag stream closed by server");
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{header, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	async fn collect(stream: TransportStream) -> Vec<TransportEvent> {
		stream.collect().await
	}

	#[tokio::test]
	async fn test_sse_events_are_parsed() {
		let server = MockServer::start().await;
		let body = concat!(
			"event: connected\ndata: ready\n\n",
			": heartbeat\n\n",
			"event: flag-update\ndata: {\"flagKey\":\"banner\",\"changeType\":\"updated\"}\n\n",
		);
		Mock::given(method("GET"))
			.and(path("/stream"))
			.and(header("x-api-key", "fs_test_key"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("content-type", "text/event-stream")
					.set_body_string(body),
			)
			.mount(&server)
			.await;

		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", "fs_test_key".parse().unwrap());
		let url = Url::parse(&format!("{}/stream", server.uri())).unwrap();

		let events = collect(SseTransport::new(Client::new()).open(url, headers)).await;
		assert_eq!(
			events,
			vec![
				TransportEvent::Open,
				TransportEvent::Event {
					event_type: "connected".to_string(),
					data: "ready".to_string(),
				},
				TransportEvent::Event {
					event_type: "flag-update".to_string(),
					data: r#"{"flagKey":"banner","changeType":"updated"}"#.to_string(),
				},
			]
		);
	}

	#[tokio::test]
	async fn test_rejected_connection_yields_error_only() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/stream"))
			.respond_with(ResponseTemplate::new(401))
			.mount(&server)
			.await;

		let url = Url::parse(&format!("{}/stream", server.uri())).unwrap();
		let events = collect(SseTransport::new(Client::new()).open(url, HeaderMap::new())).await;

		assert_eq!(events.len(), 1);
		assert!(matches!(events[0], TransportEvent::Error(_)));
	}

	#[tokio::test]
	async fn test_unreachable_server_yields_error() {
		let url = Url::parse("http://127.0.0.1:9/stream").unwrap();
		let events = collect(SseTransport::new(Client::new()).open(url, HeaderMap::new())).await;

		assert_eq!(events.len(), 1);
		assert!(matches!(events[0], TransportEvent::Error(_)));
	}
}
