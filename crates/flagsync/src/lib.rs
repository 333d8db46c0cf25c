// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feature flags Rust SDK for flagsync.
//!
//! The client keeps a local copy of every flag config in one environment and
//! evaluates flags locally with the same engine the server uses.
//!
//! # Features
//!
//! - **API key authentication**: one key per environment, sent as `x-api-key`
//! - **Real-time updates**: SSE change notifications trigger targeted refetches
//! - **Resync on reconnect**: the full cache is refetched after every reconnect
//! - **Observers**: callbacks for flag changes and context changes
//! - **Telemetry**: fire-and-forget evaluation and event tracking
//!
//! # Example
//!
//! ```ignore
//! use flagsync::{EvaluationContext, FlagsClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FlagsClient::builder()
//!         .api_key("fs_prod_xxx")
//!         .base_url("https://flags.example.com")
//!         .context(EvaluationContext::new().with_user_id("user123"))
//!         .build()?;
//!     client.initialize().await?;
//!
//!     let enabled = client
//!         .evaluate("checkout.new_flow", None)
//!         .await
//!         .and_then(|v| v.as_bool())
//!         .unwrap_or(false);
//!
//!     client.track("checkout_completed", None).await;
//!     client.close().await;
//!     Ok(())
//! }
//! ```

mod backoff;
mod cache;
mod client;
mod error;
mod fetch;
mod observer;
mod sync;
mod telemetry;
mod transport;

pub use backoff::ReconnectConfig;
pub use cache::FlagCache;
pub use client::{EvaluationDetail, FlagsClient, FlagsClientBuilder};
pub use error::{FlagsError, Result};
pub use fetch::{ConfigFetcher, HttpConfigFetcher, API_KEY_HEADER};
pub use observer::{FlagChange, FlagChangeKind, ObserverToken};
pub use telemetry::{HttpTelemetrySink, NoOpTelemetrySink, SharedTelemetrySink, TelemetrySink};
pub use transport::{SseTransport, StreamTransport, TransportEvent, TransportStream};

pub use flagsync_common_http::RetryConfig;

// Re-export core types for convenience
pub use flagsync_core::{
	ChangeType, EvaluationContext, EvaluationReason, EvaluationTelemetry, FlagConfig,
	FlagVariation, TrackedEvent, VariationValue,
};
