// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded telemetry ingest queue.
//!
//! Handlers enqueue with `try_send` and return immediately. A full queue drops
//! the newest item. The worker writes each accepted item to the tracing log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flagsync_core::{EnvironmentId, EvaluationTelemetry, TrackedEvent};

/// One accepted telemetry payload, tagged with the caller's environment.
#[derive(Debug, Clone)]
pub enum IngestItem {
	Evaluation {
		environment_id: EnvironmentId,
		telemetry: EvaluationTelemetry,
	},
	Event {
		environment_id: EnvironmentId,
		event: TrackedEvent,
	},
}

impl IngestItem {
	fn kind(&self) -> &'static str {
		match self {
			Self::Evaluation { .. } => "evaluation",
			Self::Event { .. } => "event",
		}
	}
}

#[derive(Debug, Default)]
struct Counters {
	accepted: AtomicU64,
	dropped: AtomicU64,
	processed: AtomicU64,
}

/// Snapshot of ingest counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
	pub accepted: u64,
	pub dropped: u64,
	pub processed: u64,
}

#[derive(Clone)]
pub struct TelemetryIngest {
	tx: mpsc::Sender<IngestItem>,
	counters: Arc<Counters>,
}

/// Consumer half of the queue.
pub struct IngestWorker {
	rx: mpsc::Receiver<IngestItem>,
	counters: Arc<Counters>,
}

impl TelemetryIngest {
	pub fn new(capacity: usize) -> (Self, IngestWorker) {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		let counters = Arc::new(Counters::default());
		(
			Self {
				tx,
				counters: Arc::clone(&counters),
			},
			IngestWorker { rx, counters },
		)
	}

	/// Queues an item without waiting. Returns `false` if it was dropped.
	pub fn offer(&self, item: IngestItem) -> bool {
		let kind = item.kind();
		match self.tx.try_send(item) {
			Ok(()) => {
				self.counters.accepted.fetch_add(1, Ordering::Relaxed);
				true
			}
			Err(mpsc::error::TrySendError::Full(_)) => {
				self.counters.dropped.fetch_add(1, Ordering::Relaxed);
				warn!(kind, "Telemetry queue full; dropping payload");
				false
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				self.counters.dropped.fetch_add(1, Ordering::Relaxed);
				warn!(kind, "Telemetry worker stopped; dropping payload");
				false
			}
		}
	}

	pub fn stats(&self) -> IngestStats {
		IngestStats {
			accepted: self.counters.accepted.load(Ordering::Relaxed),
			dropped: self.counters.dropped.load(Ordering::Relaxed),
			processed: self.counters.processed.load(Ordering::Relaxed),
		}
	}
}

impl IngestWorker {
	/// Drains the queue until `shutdown` fires or every sender is gone.
	pub async fn run(mut self, shutdown: CancellationToken) {
		debug!("Telemetry worker started");
		loop {
			let item = tokio::select! {
				_ = shutdown.cancelled() => break,
				item = self.rx.recv() => item,
			};
			let Some(item) = item else {
				break;
			};
			record(&item);
			self.counters.processed.fetch_add(1, Ordering::Relaxed);
		}
		debug!("Telemetry worker stopped");
	}

	pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
		tokio::spawn(self.run(shutdown))
	}
}

fn record(item: &IngestItem) {
	match item {
		IngestItem::Evaluation {
			environment_id,
			telemetry,
		} => info!(
			environment_id = %environment_id,
			flag_key = %telemetry.flag_key,
			variation_id = %telemetry.variation_id,
			bucketing_id = ?telemetry.context.bucketing_id(),
			timestamp = %telemetry.timestamp,
			"Flag evaluated"
		),
		IngestItem::Event {
			environment_id,
			event,
		} => info!(
			environment_id = %environment_id,
			event = %event.event,
			property_count = event.properties.as_ref().map(|p| p.len()).unwrap_or(0),
			bucketing_id = ?event.context.bucketing_id(),
			timestamp = %event.timestamp,
			"Event tracked"
		),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	use flagsync_core::{EvaluationContext, VariationValue};

	fn evaluation(key: &str) -> IngestItem {
		IngestItem::Evaluation {
			environment_id: EnvironmentId::new(),
			telemetry: EvaluationTelemetry::new(
				key,
				"on",
				VariationValue::Bool(true),
				EvaluationContext::new().with_user_id("u1"),
			),
		}
	}

	#[tokio::test]
	async fn test_full_queue_drops_newest() {
		let (ingest, _worker) = TelemetryIngest::new(2);
		assert!(ingest.offer(evaluation("a")));
		assert!(ingest.offer(evaluation("b")));
		assert!(!ingest.offer(evaluation("c")));

		let stats = ingest.stats();
		assert_eq!(stats.accepted, 2);
		assert_eq!(stats.dropped, 1);
	}

	#[tokio::test]
	async fn test_worker_processes_items() {
		let (ingest, worker) = TelemetryIngest::new(8);
		let shutdown = CancellationToken::new();
		worker.spawn(shutdown.clone());

		for key in ["a", "b", "c"] {
			assert!(ingest.offer(evaluation(key)));
		}
		ingest.offer(IngestItem::Event {
			environment_id: EnvironmentId::new(),
			event: TrackedEvent::new("checkout", None, EvaluationContext::new()),
		});

		tokio::time::timeout(Duration::from_secs(1), async {
			while ingest.stats().processed < 4 {
				tokio::time::sleep(Duration::from_millis(5)).await;
			}
		})
		.await
		.unwrap();
		shutdown.cancel();
	}

	#[tokio::test]
	async fn test_offer_after_worker_stops_is_dropped() {
		let (ingest, worker) = TelemetryIngest::new(4);
		drop(worker);
		assert!(!ingest.offer(evaluation("a")));
		assert_eq!(ingest.stats().dropped, 1);
	}
}
