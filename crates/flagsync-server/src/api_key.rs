// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! API key authentication for SDK-facing routes.
//!
//! The key is read from `x-api-key`, falling back to `Authorization: Bearer`.
//! Every route that carries an [`ApiKeyEnvironment`] rejects a missing or
//! unknown key with 401.

use axum::{
	extract::FromRequestParts,
	http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use flagsync_core::EnvironmentIdentity;

use crate::api::AppState;
use crate::error::ServerError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Extracts the raw API key from request headers.
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
	if let Some(key) = headers
		.get(API_KEY_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|k| !k.is_empty())
	{
		return Some(key);
	}

	let auth = headers.get(AUTHORIZATION)?.to_str().ok()?;
	let (scheme, token) = auth.split_once(' ')?;
	if !scheme.eq_ignore_ascii_case("bearer") {
		return None;
	}
	Some(token.trim()).filter(|t| !t.is_empty())
}

/// The environment resolved from the request's API key.
#[derive(Debug, Clone, Copy)]
pub struct ApiKeyEnvironment(pub EnvironmentIdentity);

impl FromRequestParts<AppState> for ApiKeyEnvironment {
	type Rejection = ServerError;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		let key = extract_api_key(&parts.headers)
			.ok_or_else(|| ServerError::Unauthorized("Missing API key".to_string()))?;
		let identity = state.store.resolve_environment(key).await?;
		Ok(Self(identity))
	}
}
