// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fan-out of flag change notifications to live streaming clients.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        UpdatePropagator                          │
//! │                                                                  │
//! │  notify_change ──► InvalidationBus (shared topic) ──► run loop   │
//! │                                                          │       │
//! │  registry: DashMap<EnvironmentId, DashMap<SinkId, Sink>> ◄┘       │
//! └──────────────────────────────────────────────────────────────────┘
//!                 │                        │
//!                 ▼                        ▼
//!        ┌────────────────┐       ┌────────────────┐
//!        │ env A sinks    │       │ env B sinks    │   ...
//!        │ mpsc per client│       │ mpsc per client│
//!        └────────────────┘       └────────────────┘
//! ```
//!
//! Each process keeps its own registry and only delivers to locally connected
//! clients. Delivery is non-blocking: a sink that is closed or whose buffer is
//! full is removed, which ends that client's stream and forces a reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flagsync_core::{ChangeType, EnvironmentId, FlagStreamEvent, InvalidationMessage, ProjectId};

use crate::bus::InvalidationBus;
use crate::error::Result;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default per-sink buffer.
pub const DEFAULT_SINK_BUFFER: usize = 64;

pub type SinkId = u64;

/// A frame written to one streaming client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkFrame {
	Update {
		flag_key: String,
		change_type: ChangeType,
	},
	Heartbeat,
}

impl SinkFrame {
	/// The stream event for this frame. Heartbeats have none.
	pub fn to_stream_event(&self) -> Option<FlagStreamEvent> {
		match self {
			Self::Update {
				flag_key,
				change_type,
			} => Some(FlagStreamEvent::flag_update(flag_key.clone(), *change_type)),
			Self::Heartbeat => None,
		}
	}
}

type Bucket = DashMap<SinkId, mpsc::Sender<SinkFrame>>;
type Registry = DashMap<EnvironmentId, Bucket>;

/// Registration of one sink. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
	environment_id: EnvironmentId,
	id: SinkId,
	registry: Weak<Registry>,
}

impl Subscription {
	pub fn environment_id(&self) -> EnvironmentId {
		self.environment_id
	}

	pub fn id(&self) -> SinkId {
		self.id
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			if remove_sink(&registry, self.environment_id, self.id) {
				debug!(
					environment_id = %self.environment_id,
					sink_id = self.id,
					"Sink unsubscribed on drop"
				);
			}
		}
	}
}

/// Removes a sink and garbage-collects its bucket if it became empty.
fn remove_sink(registry: &Registry, environment_id: EnvironmentId, id: SinkId) -> bool {
	let removed = registry
		.get(&environment_id)
		.map(|bucket| bucket.remove(&id).is_some())
		.unwrap_or(false);
	registry.remove_if(&environment_id, |_, bucket| bucket.is_empty());
	removed
}

/// Propagator statistics for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagatorStats {
	/// Environments with at least one connected sink.
	pub environment_count: usize,
	/// Connected sinks across all environments.
	pub sink_count: usize,
	/// Notifications published to the bus by this process.
	pub total_published: u64,
	/// Update frames handed to sinks.
	pub total_delivered: u64,
	/// Sinks removed because they were closed or full.
	pub total_removed: u64,
}

pub struct UpdatePropagator {
	registry: Arc<Registry>,
	bus: Arc<dyn InvalidationBus>,
	next_id: AtomicU64,
	total_published: AtomicU64,
	total_delivered: AtomicU64,
	total_removed: AtomicU64,
}

impl UpdatePropagator {
	pub fn new(bus: Arc<dyn InvalidationBus>) -> Self {
		Self {
			registry: Arc::new(DashMap::new()),
			bus,
			next_id: AtomicU64::new(1),
			total_published: AtomicU64::new(0),
			total_delivered: AtomicU64::new(0),
			total_removed: AtomicU64::new(0),
		}
	}

	/// Registers a sink for an environment.
	pub fn subscribe(
		&self,
		environment_id: EnvironmentId,
		sink: mpsc::Sender<SinkFrame>,
	) -> Subscription {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.registry
			.entry(environment_id)
			.or_default()
			.insert(id, sink);

		info!(environment_id = %environment_id, sink_id = id, "Stream client subscribed");

		Subscription {
			environment_id,
			id,
			registry: Arc::downgrade(&self.registry),
		}
	}

	/// Creates a bounded sink and registers it.
	pub fn open_sink(
		&self,
		environment_id: EnvironmentId,
		buffer: usize,
	) -> (Subscription, mpsc::Receiver<SinkFrame>) {
		let (tx, rx) = mpsc::channel(buffer.max(1));
		(self.subscribe(environment_id, tx), rx)
	}

	pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
		let removed = remove_sink(&self.registry, subscription.environment_id, subscription.id);
		if removed {
			info!(
				environment_id = %subscription.environment_id,
				sink_id = subscription.id,
				"Stream client unsubscribed"
			);
		}
		removed
	}

	/// Publishes one invalidation for a flag on the shared topic.
	pub async fn notify_change(
		&self,
		environment_id: EnvironmentId,
		project_id: ProjectId,
		flag_key: &str,
		change_type: ChangeType,
	) -> Result<()> {
		let message = InvalidationMessage::new(flag_key, environment_id, project_id, change_type);
		self.bus.publish(&message).await?;
		self.total_published.fetch_add(1, Ordering::Relaxed);
		Ok(())
	}

	/// Forwards one message to the sinks registered for its environment.
	///
	/// Returns the number of sinks that accepted the frame.
	pub fn deliver(&self, message: &InvalidationMessage) -> usize {
		let environment_id = message.environment_id;
		let frame = SinkFrame::Update {
			flag_key: message.flag_key.clone(),
			change_type: message.change_type,
		};

		let mut delivered = 0;
		let mut failed = Vec::new();
		{
			let Some(bucket) = self.registry.get(&environment_id) else {
				debug!(
					environment_id = %environment_id,
					flag_key = %message.flag_key,
					"No local sinks for environment"
				);
				return 0;
			};

			for entry in bucket.iter() {
				match entry.value().try_send(frame.clone()) {
					Ok(()) => delivered += 1,
					Err(mpsc::error::TrySendError::Full(_)) => {
						warn!(
							environment_id = %environment_id,
							sink_id = *entry.key(),
							"Sink buffer full; dropping client"
						);
						failed.push(*entry.key());
					}
					Err(mpsc::error::TrySendError::Closed(_)) => {
						debug!(
							environment_id = %environment_id,
							sink_id = *entry.key(),
							"Sink closed"
						);
						failed.push(*entry.key());
					}
				}
			}
		}

		for id in &failed {
			remove_sink(&self.registry, environment_id, *id);
		}

		self.total_delivered
			.fetch_add(delivered as u64, Ordering::Relaxed);
		self.total_removed
			.fetch_add(failed.len() as u64, Ordering::Relaxed);

		debug!(
			environment_id = %environment_id,
			flag_key = %message.flag_key,
			change_type = %message.change_type,
			delivered,
			removed = failed.len(),
			"Fanned out flag update"
		);
		delivered
	}

	/// Sends a heartbeat frame to every sink. Returns the number that accepted it.
	pub fn heartbeat(&self) -> usize {
		let mut delivered = 0;
		let mut failed = Vec::new();

		for bucket in self.registry.iter() {
			for entry in bucket.value().iter() {
				match entry.value().try_send(SinkFrame::Heartbeat) {
					Ok(()) => delivered += 1,
					Err(_) => failed.push((*bucket.key(), *entry.key())),
				}
			}
		}

		for (environment_id, id) in &failed {
			remove_sink(&self.registry, *environment_id, *id);
		}
		self.total_removed
			.fetch_add(failed.len() as u64, Ordering::Relaxed);

		debug!(sinks = delivered, removed = failed.len(), "Sent heartbeat");
		delivered
	}

	/// Removes every local sink. Their streams end and the clients reconnect
	/// with a full resync. Returns the number of sinks removed.
	pub fn drop_all_sinks(&self) -> usize {
		let removed: usize = self.registry.iter().map(|bucket| bucket.len()).sum();
		self.registry.clear();
		self.total_removed
			.fetch_add(removed as u64, Ordering::Relaxed);
		removed
	}

	/// Consumes the bus until `shutdown` fires or the bus closes.
	///
	/// Messages skipped by a lagging receiver cannot be replayed, so a lag
	/// drops every local sink.
	pub async fn run(&self, shutdown: CancellationToken) {
		let receiver = self.bus.subscribe();
		self.consume(receiver, shutdown).await;
	}

	/// Subscribes to the bus now and consumes it on a background task.
	pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
		let receiver = self.bus.subscribe();
		let this = Arc::clone(self);
		tokio::spawn(async move { this.consume(receiver, shutdown).await })
	}

	async fn consume(
		&self,
		mut receiver: broadcast::Receiver<InvalidationMessage>,
		shutdown: CancellationToken,
	) {
		info!("Update propagator started");
		loop {
			tokio::select! {
				_ = shutdown.cancelled() => break,
				received = receiver.recv() => match received {
					Ok(message) => {
						self.deliver(&message);
					}
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						let dropped = self.drop_all_sinks();
						warn!(
							skipped,
							dropped,
							"Update propagator lagged behind the bus; dropping sinks so clients resync"
						);
					}
					Err(broadcast::error::RecvError::Closed) => {
						warn!("Invalidation bus closed");
						break;
					}
				}
			}
		}
		info!("Update propagator stopped");
	}

	/// Sends heartbeats on a fixed interval until `shutdown` fires.
	pub fn spawn_heartbeat(
		self: &Arc<Self>,
		interval: Duration,
		shutdown: CancellationToken,
	) -> JoinHandle<()> {
		let this = Arc::clone(self);
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			// The first tick completes immediately.
			ticker.tick().await;
			loop {
				tokio::select! {
					_ = shutdown.cancelled() => break,
					_ = ticker.tick() => {
						this.heartbeat();
					}
				}
			}
		})
	}

	pub fn environment_count(&self) -> usize {
		self.registry.len()
	}

	pub fn sink_count(&self) -> usize {
		self.registry.iter().map(|bucket| bucket.len()).sum()
	}

	pub fn sink_count_for(&self, environment_id: EnvironmentId) -> usize {
		self.registry
			.get(&environment_id)
			.map(|bucket| bucket.len())
			.unwrap_or(0)
	}

	pub fn stats(&self) -> PropagatorStats {
		PropagatorStats {
			environment_count: self.environment_count(),
			sink_count: self.sink_count(),
			total_published: self.total_published.load(Ordering::Relaxed),
			total_delivered: self.total_delivered.load(Ordering::Relaxed),
			total_removed: self.total_removed.load(Ordering::Relaxed),
		}
	}
}
