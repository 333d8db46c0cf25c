// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconnect backoff for the flag stream.

use std::time::Duration;

use flagsync_common_http::{backoff_delay, RetryConfig};

/// Delay schedule between stream connection attempts.
///
/// Delays start at `base_delay`, double per consecutive failure up to `max_delay`,
/// and are scaled by a random factor in `[1 - jitter, 1 + jitter]`. Attempts are
/// unbounded.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub jitter: f64,
}

impl Default for ReconnectConfig {
	fn default() -> Self {
		Self {
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
			jitter: 0.25,
		}
	}
}

impl ReconnectConfig {
	/// Delay before reconnecting after `failures` consecutive failed attempts.
	pub fn delay(&self, failures: u32) -> Duration {
		backoff_delay(
			&RetryConfig {
				max_attempts: u32::MAX,
				base_delay: self.base_delay,
				max_delay: self.max_delay,
				backoff_factor: 2.0,
				jitter: self.jitter,
			},
			failures,
		)
	}
}
