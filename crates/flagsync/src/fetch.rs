// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag config fetching.

use std::collections::HashMap;

use async_trait::async_trait;
use flagsync_core::FlagConfig;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, instrument, warn};

use crate::error::{FlagsError, Result};

/// Header carrying the environment API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Source of flag configs for one environment.
#[async_trait]
pub trait ConfigFetcher: Send + Sync + 'static {
	/// Fetches every servable flag config.
	async fn fetch_all(&self) -> Result<HashMap<String, FlagConfig>>;

	/// Fetches one flag config. `None` means the flag has no servable config.
	async fn fetch_one(&self, flag_key: &str) -> Result<Option<FlagConfig>>;
}

/// Fetches configs from `GET /flag-config/all` and `GET /flag-config/{flagKey}`.
#[derive(Debug, Clone)]
pub struct HttpConfigFetcher {
	http: Client,
	base_url: Url,
	api_key: String,
}

impl HttpConfigFetcher {
	pub fn new(http: Client, base_url: Url, api_key: impl Into<String>) -> Self {
		Self {
			http,
			base_url,
			api_key: api_key.into(),
		}
	}

	fn url(&self, segments: &[&str]) -> Result<Url> {
		endpoint(&self.base_url, segments)
	}
}

/// Appends path segments to a base URL, escaping each segment.
pub(crate) fn endpoint(base_url: &Url, segments: &[&str]) -> Result<Url> {
	let mut url = base_url.clone();
	url
		.path_segments_mut()
		.map_err(|_| FlagsError::InvalidBaseUrl(base_url.to_string()))?
		.pop_if_empty()
		.extend(segments);
	Ok(url)
}

/// Maps a non-success status to an error.
pub(crate) async fn status_error(response: reqwest::Response) -> FlagsError {
	let status = response.status();
	if status == StatusCode::UNAUTHORIZED {
		return FlagsError::Unauthorized;
	}
	FlagsError::ServerError {
		status: status.as_u16(),
		message: response.text().await.unwrap_or_default(),
	}
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
	#[instrument(skip(self))]
	async fn fetch_all(&self) -> Result<HashMap<String, FlagConfig>> {
		let response = self
			.http
			.get(self.url(&["flag-config", "all"])?)
			.header(API_KEY_HEADER, &self.api_key)
			.send()
			.await
			.map_err(FlagsError::from_reqwest)?;

		if !response.status().is_success() {
			return Err(status_error(response).await);
		}

		let configs: HashMap<String, FlagConfig> = response
			.json()
			.await
			.map_err(|e| FlagsError::ParseFailed(e.to_string()))?;

		let configs: HashMap<String, FlagConfig> = configs
			.into_iter()
			.filter(|(key, config)| match config.validate() {
				Ok(()) => true,
				Err(e) => {
					warn!(flag_key = %key, error = %e, "Discarding invalid flag config");
					false
				}
			})
			.collect();

		debug!(flags = configs.len(), "Fetched all flag configs");
		Ok(configs)
	}

	#[instrument(skip(self), fields(flag_key = %flag_key))]
	async fn fetch_one(&self, flag_key: &str) -> Result<Option<FlagConfig>> {
		let response = self
			.http
			.get(self.url(&["flag-config", flag_key])?)
			.header(API_KEY_HEADER, &self.api_key)
			.send()
			.await
			.map_err(FlagsError::from_reqwest)?;

		if response.status() == StatusCode::NOT_FOUND {
			debug!("Flag config not found");
			return Ok(None);
		}
		if !response.status().is_success() {
			return Err(status_error(response).await);
		}

		let config: FlagConfig = response
			.json()
			.await
			.map_err(|e| FlagsError::ParseFailed(e.to_string()))?;

		if let Err(e) = config.validate() {
			warn!(error = %e, "Treating invalid flag config as absent");
			return Ok(None);
		}
		Ok(Some(config))
	}
}
