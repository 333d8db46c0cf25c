// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server error types and HTTP response conversions.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::{Deserialize, Serialize};

use flagsync_server_flags::FlagsServerError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	/// Config store, cache or source-of-record failure.
	#[error(transparent)]
	Flags(#[from] FlagsServerError),

	/// Database pool setup failed.
	#[error("Database error: {0}")]
	Db(#[from] sqlx::Error),

	/// Missing or unknown API key.
	#[error("Unauthorized: {0}")]
	Unauthorized(String),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Invalid request: {0}")]
	BadRequest(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl ErrorResponse {
	fn new(error: &str, message: impl Into<String>) -> Self {
		Self {
			error: error.to_string(),
			message: message.into(),
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, body) = match &self {
			ServerError::Flags(FlagsServerError::InvalidApiKey) => (
				StatusCode::UNAUTHORIZED,
				ErrorResponse::new("unauthorized", "Invalid API key"),
			),
			ServerError::Flags(FlagsServerError::NotFound(what)) => (
				StatusCode::NOT_FOUND,
				ErrorResponse::new("not_found", format!("Not found: {what}")),
			),
			ServerError::Flags(e) => {
				tracing::error!(error = %e, "config store error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("store_error", "A config store error occurred"),
				)
			}
			ServerError::Db(e) => {
				tracing::error!(error = %e, "database error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("database_error", "A database error occurred"),
				)
			}
			ServerError::Unauthorized(msg) => (
				StatusCode::UNAUTHORIZED,
				ErrorResponse::new("unauthorized", msg.clone()),
			),
			ServerError::NotFound(what) => (
				StatusCode::NOT_FOUND,
				ErrorResponse::new("not_found", format!("Not found: {what}")),
			),
			ServerError::BadRequest(msg) => (
				StatusCode::BAD_REQUEST,
				ErrorResponse::new("bad_request", msg.clone()),
			),
			ServerError::Internal(msg) => {
				tracing::error!(error = %msg, "internal error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("internal_error", "An internal error occurred"),
				)
			}
		};

		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_invalid_api_key_is_unauthorized() {
		let response = ServerError::from(FlagsServerError::InvalidApiKey).into_response();
		assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	}

	#[test]
	fn test_store_failure_is_internal() {
		let response =
			ServerError::from(FlagsServerError::Internal("boom".to_string())).into_response();
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[test]
	fn test_not_found_maps_to_404() {
		assert_eq!(
			ServerError::NotFound("banner".to_string())
				.into_response()
				.status(),
			StatusCode::NOT_FOUND
		);
		assert_eq!(
			ServerError::from(FlagsServerError::NotFound("env".to_string()))
				.into_response()
				.status(),
			StatusCode::NOT_FOUND
		);
	}
}
