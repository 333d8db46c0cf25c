// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use flagsync_common_http::RetryableError;
use thiserror::Error;

/// Errors returned by the flags client.
#[derive(Debug, Error)]
pub enum FlagsError {
	#[error("API key is required")]
	MissingApiKey,

	#[error("API key is not a valid header value")]
	InvalidApiKey,

	#[error("base URL is required")]
	MissingBaseUrl,

	#[error("invalid base URL: {0}")]
	InvalidBaseUrl(String),

	#[error("connection failed: {0}")]
	ConnectionFailed(#[source] reqwest::Error),

	#[error("request timed out")]
	Timeout,

	#[error("unauthorized: API key was rejected")]
	Unauthorized,

	#[error("server error {status}: {message}")]
	ServerError { status: u16, message: String },

	#[error("failed to parse response: {0}")]
	ParseFailed(String),

	#[error("stream error: {0}")]
	StreamError(String),

	#[error("client is closed")]
	ClientClosed,
}

impl FlagsError {
	/// Whether retrying the same request may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::ConnectionFailed(_) | Self::Timeout | Self::StreamError(_) => true,
			Self::ServerError { status, .. } => *status >= 500 || *status == 429 || *status == 408,
			_ => false,
		}
	}

	pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			Self::Timeout
		} else if err.is_decode() {
			Self::ParseFailed(err.to_string())
		} else {
			Self::ConnectionFailed(err)
		}
	}
}

impl RetryableError for FlagsError {
	fn is_retryable(&self) -> bool {
		FlagsError::is_retryable(self)
	}
}

pub type Result<T> = std::result::Result<T, FlagsError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_retryable_classification() {
		assert!(FlagsError::Timeout.is_retryable());
		assert!(FlagsError::ServerError {
			status: 503,
			message: String::new()
		}
		.is_retryable());
		assert!(FlagsError::ServerError {
			status: 429,
			message: String::new()
		}
		.is_retryable());
		assert!(!FlagsError::ServerError {
			status: 400,
			message: String::new()
		}
		.is_retryable());
		assert!(!FlagsError::Unauthorized.is_retryable());
		assert!(!FlagsError::ClientClosed.is_retryable());
	}
}
