// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for flagsync-server.

pub mod cache;
pub mod database;
pub mod http;
pub mod logging;
pub mod stream;

pub use cache::{CacheBackend, CacheConfig, CacheConfigLayer};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
pub use stream::{StreamConfig, StreamConfigLayer};
