// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors that can occur in the flag data model.
#[derive(Debug, Error)]
pub enum FlagsError {
	#[error("default variation {0} is not among the flag's variations")]
	DefaultVariationMissing(String),

	#[error("rule {rule_id} references unknown variation {variation_id}")]
	UnknownVariation {
		rule_id: String,
		variation_id: String,
	},

	#[error("invalid stream event: {0}")]
	InvalidStreamEvent(String),

	#[error("invalid payload: {0}")]
	InvalidPayload(String),

	#[error("serialization error: {0}")]
	Serialization(String),
}

impl From<serde_json::Error> for FlagsError {
	fn from(err: serde_json::Error) -> Self {
		FlagsError::Serialization(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, FlagsError>;
