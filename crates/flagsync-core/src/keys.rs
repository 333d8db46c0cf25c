// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared cache key scheme.

use crate::environment::EnvironmentId;

/// Lifetime of an `api_key:*` cache entry: one week.
pub const API_KEY_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Cache key for a materialized flag config: `config:{environmentId}:{flagKey}`.
pub fn config_cache_key(environment_id: EnvironmentId, flag_key: &str) -> String {
	format!("config:{environment_id}:{flag_key}")
}

/// Cache key for an API key's environment identity: `api_key:{apiKey}`.
pub fn api_key_cache_key(api_key: &str) -> String {
	format!("api_key:{api_key}")
}
