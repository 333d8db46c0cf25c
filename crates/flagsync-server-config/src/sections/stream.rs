// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming, fan-out and telemetry ingest configuration section.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SINK_BUFFER: usize = 64;
pub const DEFAULT_TOPIC: &str = "flagsync:invalidations";
pub const DEFAULT_INGEST_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamConfigLayer {
	pub heartbeat_interval_secs: Option<u64>,
	pub sink_buffer: Option<usize>,
	pub topic: Option<String>,
	pub ingest_queue_capacity: Option<usize>,
}

impl StreamConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.heartbeat_interval_secs.is_some() {
			self.heartbeat_interval_secs = other.heartbeat_interval_secs;
		}
		if other.sink_buffer.is_some() {
			self.sink_buffer = other.sink_buffer;
		}
		if other.topic.is_some() {
			self.topic = other.topic;
		}
		if other.ingest_queue_capacity.is_some() {
			self.ingest_queue_capacity = other.ingest_queue_capacity;
		}
	}

	pub fn finalize(self) -> StreamConfig {
		StreamConfig {
			heartbeat_interval_secs: self
				.heartbeat_interval_secs
				.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS),
			sink_buffer: self.sink_buffer.unwrap_or(DEFAULT_SINK_BUFFER),
			topic: self.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
			ingest_queue_capacity: self
				.ingest_queue_capacity
				.unwrap_or(DEFAULT_INGEST_QUEUE_CAPACITY),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
	pub heartbeat_interval_secs: u64,
	/// Frames buffered per streaming client before it is treated as failed.
	pub sink_buffer: usize,
	pub topic: String,
	pub ingest_queue_capacity: usize,
}

impl Default for StreamConfig {
	fn default() -> Self {
		StreamConfigLayer::default().finalize()
	}
}
