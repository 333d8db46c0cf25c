// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Streaming and invalidation message types.
//!
//! Two message shapes travel through the system when a flag changes:
//!
//! - [`InvalidationMessage`] is published on the shared broadcast topic, once per
//!   config-store mutation, and is consumed by every server process.
//! - [`FlagStreamEvent`] is what a server process writes to each connected
//!   streaming client for that environment.

use serde::{Deserialize, Serialize};

use crate::environment::{EnvironmentId, ProjectId};
use crate::{FlagsError, Result};

/// SSE event name sent once when a stream opens.
pub const EVENT_CONNECTED: &str = "connected";

/// SSE event name for a flag change.
pub const EVENT_FLAG_UPDATE: &str = "flag-update";

/// Kind of change a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
	/// The flag's config was replaced; readers should refetch it.
	Updated,
	/// The flag no longer has a servable config in the environment.
	Deleted,
}

impl ChangeType {
	pub fn is_deletion(&self) -> bool {
		matches!(self, Self::Deleted)
	}
}

impl std::fmt::Display for ChangeType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Updated => f.write_str("updated"),
			Self::Deleted => f.write_str("deleted"),
		}
	}
}

/// Payload of a `flag-update` stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagUpdateData {
	pub flag_key: String,
	pub change_type: ChangeType,
}

/// Events delivered to streaming clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagStreamEvent {
	/// Sent once when the stream opens. Carries no payload.
	Connected,
	/// A flag changed in the client's environment.
	FlagUpdate(FlagUpdateData),
}

impl FlagStreamEvent {
	pub fn connected() -> Self {
		Self::Connected
	}

	pub fn flag_update(flag_key: impl Into<String>, change_type: ChangeType) -> Self {
		Self::FlagUpdate(FlagUpdateData {
			flag_key: flag_key.into(),
			change_type,
		})
	}

	/// Returns the SSE event name.
	pub fn event_type(&self) -> &'static str {
		match self {
			Self::Connected => EVENT_CONNECTED,
			Self::FlagUpdate(_) => EVENT_FLAG_UPDATE,
		}
	}

	/// Returns the SSE data field. Empty for `connected`.
	pub fn data(&self) -> Result<String> {
		match self {
			Self::Connected => Ok(String::new()),
			Self::FlagUpdate(data) => Ok(serde_json::to_string(data)?),
		}
	}

	/// Parses an SSE event name and data field.
	///
	/// Returns `Ok(None)` for event names this version does not know about.
	pub fn from_sse(event_type: &str, data: &str) -> Result<Option<Self>> {
		match event_type {
			EVENT_CONNECTED => Ok(Some(Self::Connected)),
			EVENT_FLAG_UPDATE => {
				let parsed: FlagUpdateData = serde_json::from_str(data)
					.map_err(|e| FlagsError::InvalidStreamEvent(e.to_string()))?;
				if parsed.flag_key.is_empty() {
					return Err(FlagsError::InvalidStreamEvent(
						"flag-update without flagKey".to_string(),
					));
				}
				Ok(Some(Self::FlagUpdate(parsed)))
			}
			_ => Ok(None),
		}
	}
}

/// Message published on the shared invalidation topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationMessage {
	pub flag_key: String,
	pub environment_id: EnvironmentId,
	pub project_id: ProjectId,
	pub change_type: ChangeType,
}

impl InvalidationMessage {
	pub fn new(
		flag_key: impl Into<String>,
		environment_id: EnvironmentId,
		project_id: ProjectId,
		change_type: ChangeType,
	) -> Self {
		Self {
			flag_key: flag_key.into(),
			environment_id,
			project_id,
			change_type,
		}
	}

	/// The event to forward to the environment's streaming clients.
	pub fn to_stream_event(&self) -> FlagStreamEvent {
		FlagStreamEvent::flag_update(self.flag_key.clone(), self.change_type)
	}
}
