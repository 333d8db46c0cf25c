// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP route handlers.

pub mod evaluate;
pub mod flag_config;
pub mod health;
pub mod stream;
pub mod track;
