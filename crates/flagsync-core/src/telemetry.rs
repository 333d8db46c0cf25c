// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry payloads posted by SDKs after evaluations and for custom events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::EvaluationContext;
use crate::flag::VariationValue;
use crate::{FlagsError, Result};

/// One observed evaluation, sent to `POST /track/evaluation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationTelemetry {
	pub flag_key: String,
	pub variation_id: String,
	pub value: VariationValue,
	#[serde(default)]
	pub context: EvaluationContext,
	pub timestamp: DateTime<Utc>,
}

impl EvaluationTelemetry {
	pub fn new(
		flag_key: impl Into<String>,
		variation_id: impl Into<String>,
		value: VariationValue,
		context: EvaluationContext,
	) -> Self {
		Self {
			flag_key: flag_key.into(),
			variation_id: variation_id.into(),
			value,
			context,
			timestamp: Utc::now(),
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.flag_key.trim().is_empty() {
			return Err(FlagsError::InvalidPayload("flagKey is required".to_string()));
		}
		if self.variation_id.trim().is_empty() {
			return Err(FlagsError::InvalidPayload(
				"variationId is required".to_string(),
			));
		}
		Ok(())
	}
}

/// A custom event, sent to `POST /track/event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEvent {
	pub event: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub properties: Option<Map<String, Value>>,
	#[serde(default)]
	pub context: EvaluationContext,
	pub timestamp: DateTime<Utc>,
}

impl TrackedEvent {
	pub fn new(
		event: impl Into<String>,
		properties: Option<Map<String, Value>>,
		context: EvaluationContext,
	) -> Self {
		Self {
			event: event.into(),
			properties,
			context,
			timestamp: Utc::now(),
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.event.trim().is_empty() {
			return Err(FlagsError::InvalidPayload("event is required".to_string()));
		}
		Ok(())
	}
}
