// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared invalidation topic.
//!
//! Every server process subscribes to the topic and forwards what it receives
//! to its own streaming clients. The topic is the only cross-process fan-out
//! path; a process that publishes also receives its own message back.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, Client};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flagsync_core::InvalidationMessage;

use crate::error::Result;

/// Default topic name for invalidation messages.
pub const DEFAULT_TOPIC: &str = "flagsync:invalidations";

const DEFAULT_BUS_CAPACITY: usize = 1024;
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
pub trait InvalidationBus: Send + Sync {
	async fn publish(&self, message: &InvalidationMessage) -> Result<()>;

	/// Returns a receiver for messages published after this call.
	fn subscribe(&self) -> broadcast::Receiver<InvalidationMessage>;
}

/// Single-process bus over a tokio broadcast channel.
#[derive(Clone)]
pub struct LocalBus {
	sender: broadcast::Sender<InvalidationMessage>,
}

impl LocalBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _receiver) = broadcast::channel(capacity.max(1));
		Self { sender }
	}
}

impl Default for LocalBus {
	fn default() -> Self {
		Self::new(DEFAULT_BUS_CAPACITY)
	}
}

#[async_trait]
impl InvalidationBus for LocalBus {
	async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
		match self.sender.send(message.clone()) {
			Ok(receivers) => debug!(
				flag_key = %message.flag_key,
				environment_id = %message.environment_id,
				receivers,
				"Published invalidation"
			),
			Err(_) => debug!(
				flag_key = %message.flag_key,
				"No bus listeners for invalidation"
			),
		}
		Ok(())
	}

	fn subscribe(&self) -> broadcast::Receiver<InvalidationMessage> {
		self.sender.subscribe()
	}
}

/// Multi-process bus over Redis pub/sub.
///
/// Publishing uses `PUBLISH` on a managed connection. A listener task holds a
/// dedicated pub/sub connection and forwards decoded messages into a local
/// broadcast channel, resubscribing if the connection drops.
pub struct RedisBus {
	topic: String,
	publisher: ConnectionManager,
	local: broadcast::Sender<InvalidationMessage>,
	shutdown: CancellationToken,
	listener: JoinHandle<()>,
}

impl RedisBus {
	pub async fn connect(url: &str, topic: &str, capacity: usize) -> Result<Self> {
		let client = Client::open(url)?;
		let publisher = ConnectionManager::new(client.clone()).await?;
		let (local, _receiver) = broadcast::channel(capacity.max(1));
		let shutdown = CancellationToken::new();

		// Subscribe once up front so connection errors surface to the caller.
		let mut pubsub = client.get_async_pubsub().await?;
		pubsub.subscribe(topic).await?;
		info!(topic = %topic, "Subscribed to invalidation topic");

		let listener = tokio::spawn(listen(
			client,
			pubsub,
			topic.to_string(),
			local.clone(),
			shutdown.clone(),
		));

		Ok(Self {
			topic: topic.to_string(),
			publisher,
			local,
			shutdown,
			listener,
		})
	}

	pub fn topic(&self) -> &str {
		&self.topic
	}
}

impl Drop for RedisBus {
	fn drop(&mut self) {
		self.shutdown.cancel();
		self.listener.abort();
	}
}

#[async_trait]
impl InvalidationBus for RedisBus {
	async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
		let payload = serde_json::to_string(message)?;
		let mut conn = self.publisher.clone();
		let receivers: i64 = redis::cmd("PUBLISH")
			.arg(&self.topic)
			.arg(payload)
			.query_async(&mut conn)
			.await?;

		debug!(
			topic = %self.topic,
			flag_key = %message.flag_key,
			environment_id = %message.environment_id,
			receivers,
			"Published invalidation"
		);
		Ok(())
	}

	fn subscribe(&self) -> broadcast::Receiver<InvalidationMessage> {
		self.local.subscribe()
	}
}

async fn listen(
	client: Client,
	mut pubsub: redis::aio::PubSub,
	topic: String,
	local: broadcast::Sender<InvalidationMessage>,
	shutdown: CancellationToken,
) {
	loop {
		forward(&mut pubsub, &topic, &local, &shutdown).await;
		if shutdown.is_cancelled() {
			break;
		}

		warn!(topic = %topic, "Invalidation subscription ended; resubscribing");
		pubsub = loop {
			tokio::select! {
				_ = shutdown.cancelled() => return,
				_ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
			}
			match resubscribe(&client, &topic).await {
				Ok(pubsub) => break pubsub,
				Err(e) => error!(topic = %topic, error = %e, "Failed to resubscribe to invalidation topic"),
			}
		};
		info!(topic = %topic, "Resubscribed to invalidation topic");
	}
	debug!(topic = %topic, "Invalidation listener stopped");
}

async fn resubscribe(client: &Client, topic: &str) -> Result<redis::aio::PubSub> {
	let mut pubsub = client.get_async_pubsub().await?;
	pubsub.subscribe(topic).await?;
	Ok(pubsub)
}

async fn forward(
	pubsub: &mut redis::aio::PubSub,
	topic: &str,
	local: &broadcast::Sender<InvalidationMessage>,
	shutdown: &CancellationToken,
) {
	let mut messages = pubsub.on_message();
	loop {
		let msg = tokio::select! {
			_ = shutdown.cancelled() => return,
			msg = messages.next() => msg,
		};
		let Some(msg) = msg else {
			return;
		};

		let payload: String = match msg.get_payload() {
			Ok(p) => p,
			Err(e) => {
				warn!(topic = %topic, error = %e, "Dropping unreadable invalidation payload");
				continue;
			}
		};

		match serde_json::from_str::<InvalidationMessage>(&payload) {
			Ok(message) => {
				let _ = local.send(message);
			}
			Err(e) => warn!(topic = %topic, error = %e, "Dropping malformed invalidation message"),
		}
	}
}
