// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change stream consumption and reconnect loop.
//!
//! One task per client runs [`run_sync_loop`]: connect, apply events until the
//! stream breaks, back off, reconnect. Every connect after the first resyncs the
//! whole cache from a bulk fetch, since notifications sent while disconnected are
//! lost.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use flagsync_core::{FlagStreamEvent, FlagUpdateData};
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::client::ClientInner;
use crate::error::Result;
use crate::observer::{FlagChange, FlagChangeKind};
use crate::transport::TransportEvent;

pub(crate) async fn run_sync_loop(inner: Arc<ClientInner>) {
	let shutdown = inner.shutdown.clone();
	let mut connected_once = false;
	let mut failures: u32 = 0;

	while !shutdown.is_cancelled() {
		let mut stream = inner
			.transport
			.open(inner.stream_url.clone(), inner.stream_headers.clone());

		loop {
			let next = tokio::select! {
				_ = shutdown.cancelled() => {
					info!("Flag stream received shutdown signal");
					inner.connected.store(false, Ordering::SeqCst);
					return;
				}
				next = stream.next() => next,
			};

			match next {
				Some(TransportEvent::Open) => {
					inner.connected.store(true, Ordering::SeqCst);
					failures = 0;
					info!("Flag stream connected");

					if connected_once {
						if let Err(e) = resync(&inner).await {
							error!(error = %e, "Resync after reconnect failed");
							break;
						}
					}
					connected_once = true;
				}
				Some(TransportEvent::Event { event_type, data }) => {
					apply_event(&inner, &event_type, &data).await;
				}
				Some(TransportEvent::Error(message)) => {
					warn!(error = %message, "Flag stream error");
					break;
				}
				None => {
					debug!("Flag stream ended");
					break;
				}
			}
		}

		inner.connected.store(false, Ordering::SeqCst);

		let delay = inner.reconnect.delay(failures);
		failures = failures.saturating_add(1);
		inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
		warn!(
			delay_ms = delay.as_millis() as u64,
			attempt = failures,
			"Reconnecting to flag stream"
		);

		tokio::select! {
			_ = tokio::time::sleep(delay) => {}
			_ = shutdown.cancelled() => {
				info!("Flag stream received shutdown signal during reconnect wait");
				break;
			}
		}
	}
}

/// Replaces the local cache with a fresh bulk fetch.
async fn resync(inner: &ClientInner) -> Result<()> {
	let configs = inner.fetcher.fetch_all().await?;
	let flags = configs.len();
	let touched = inner.cache.replace_all(configs).await;
	info!(flags, "Flag cache resynced");
	inner
		.observers
		.notify_all(touched, FlagChangeKind::Changed);
	Ok(())
}

/// Applies one stream event. Malformed events are logged and dropped.
pub(crate) async fn apply_event(inner: &ClientInner, event_type: &str, data: &str) {
	match FlagStreamEvent::from_sse(event_type, data) {
		Ok(Some(FlagStreamEvent::Connected)) => debug!("Flag stream handshake received"),
		Ok(Some(FlagStreamEvent::FlagUpdate(update))) => apply_update(inner, update).await,
		Ok(None) => debug!(event_type = %event_type, "Ignoring unknown stream event"),
		Err(e) => warn!(event_type = %event_type, error = %e, "Dropping malformed stream event"),
	}
}

async fn apply_update(inner: &ClientInner, update: FlagUpdateData) {
	let flag_key = update.flag_key;

	if update.change_type.is_deletion() {
		remove_flag(inner, flag_key).await;
		return;
	}

	match inner.fetcher.fetch_one(&flag_key).await {
		Ok(Some(config)) => {
			inner.cache.upsert(config).await;
			debug!(flag_key = %flag_key, "Flag config replaced");
			inner.observers.notify(&FlagChange {
				flag_key,
				kind: FlagChangeKind::Changed,
			});
		}
		Ok(None) => remove_flag(inner, flag_key).await,
		Err(e) => {
			error!(flag_key = %flag_key, error = %e, "Failed to refetch flag; serving cached config");
		}
	}
}

async fn remove_flag(inner: &ClientInner, flag_key: String) {
	let existed = inner.cache.remove(&flag_key).await;
	debug!(flag_key = %flag_key, existed, "Flag removed");
	inner.observers.notify(&FlagChange {
		flag_key,
		kind: FlagChangeKind::Removed,
	});
}
