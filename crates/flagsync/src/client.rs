// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The flags client.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flagsync_common_http::{retry, RetryConfig};
use flagsync_core::{
	evaluate_detailed, EvaluationContext, EvaluationReason, EvaluationTelemetry, TrackedEvent,
	VariationValue,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backoff::ReconnectConfig;
use crate::cache::FlagCache;
use crate::error::{FlagsError, Result};
use crate::fetch::{endpoint, ConfigFetcher, HttpConfigFetcher, API_KEY_HEADER};
use crate::observer::{FlagChange, FlagChangeKind, ObserverSet, ObserverToken};
use crate::sync::run_sync_loop;
use crate::telemetry::{HttpTelemetrySink, SharedTelemetrySink};
use crate::transport::{SseTransport, StreamTransport};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a local evaluation with the detail behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
	pub flag_key: String,
	pub variation_id: String,
	pub value: VariationValue,
	pub reason: EvaluationReason,
}

/// Builder for [`FlagsClient`].
pub struct FlagsClientBuilder {
	api_key: Option<String>,
	base_url: Option<String>,
	context: EvaluationContext,
	request_timeout: Duration,
	streaming: bool,
	reconnect: ReconnectConfig,
	fetch_retry: RetryConfig,
	fetcher: Option<Arc<dyn ConfigFetcher>>,
	transport: Option<Arc<dyn StreamTransport>>,
	telemetry: Option<SharedTelemetrySink>,
}

impl Default for FlagsClientBuilder {
	fn default() -> Self {
		Self {
			api_key: None,
			base_url: None,
			context: EvaluationContext::new(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			streaming: true,
			reconnect: ReconnectConfig::default(),
			fetch_retry: RetryConfig::default(),
			fetcher: None,
			transport: None,
			telemetry: None,
		}
	}
}

impl FlagsClientBuilder {
	/// Environment API key, sent as `x-api-key`.
	pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
		self.api_key = Some(api_key.into());
		self
	}

	pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());
		self
	}

	/// Base context every evaluation starts from.
	pub fn context(mut self, context: EvaluationContext) -> Self {
		self.context = context;
		self
	}

	/// Timeout for config fetches and telemetry posts. The stream is exempt.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	/// Disables the change stream; the client serves its initial bulk fetch.
	pub fn streaming(mut self, enabled: bool) -> Self {
		self.streaming = enabled;
		self
	}

	pub fn reconnect(mut self, config: ReconnectConfig) -> Self {
		self.reconnect = config;
		self
	}

	/// Retry policy for the initial bulk fetch.
	pub fn fetch_retry(mut self, config: RetryConfig) -> Self {
		self.fetch_retry = config;
		self
	}

	pub fn fetcher(mut self, fetcher: Arc<dyn ConfigFetcher>) -> Self {
		self.fetcher = Some(fetcher);
		self
	}

	pub fn transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn telemetry_sink(mut self, sink: SharedTelemetrySink) -> Self {
		self.telemetry = Some(sink);
		self
	}

	pub fn build(self) -> Result<FlagsClient> {
		let api_key = self
			.api_key
			.filter(|k| !k.trim().is_empty())
			.ok_or(FlagsError::MissingApiKey)?;
		let api_key_header = HeaderValue::from_str(&api_key).map_err(|_| FlagsError::InvalidApiKey)?;

		let base_url = self.base_url.ok_or(FlagsError::MissingBaseUrl)?;
		let base_url =
			Url::parse(&base_url).map_err(|e| FlagsError::InvalidBaseUrl(e.to_string()))?;
		let stream_url = endpoint(&base_url, &["stream"])?;

		let http = flagsync_common_http::new_client_with_timeout(self.request_timeout)
			.map_err(FlagsError::ConnectionFailed)?;

		let fetcher = match self.fetcher {
			Some(fetcher) => fetcher,
			None => Arc::new(HttpConfigFetcher::new(
				http.clone(),
				base_url.clone(),
				api_key.clone(),
			)),
		};
		let telemetry = match self.telemetry {
			Some(sink) => sink,
			None => Arc::new(HttpTelemetrySink::new(http, base_url, api_key)),
		};
		let transport = match self.transport {
			Some(transport) => transport,
			None => {
				let stream_http = flagsync_common_http::builder()
					.connect_timeout(self.request_timeout)
					.build()
					.map_err(FlagsError::ConnectionFailed)?;
				Arc::new(SseTransport::new(stream_http))
			}
		};

		let mut stream_headers = HeaderMap::new();
		stream_headers.insert(API_KEY_HEADER, api_key_header);

		Ok(FlagsClient {
			inner: Arc::new(ClientInner {
				stream_url,
				stream_headers,
				streaming: self.streaming,
				reconnect: self.reconnect,
				fetch_retry: self.fetch_retry,
				fetcher,
				transport,
				telemetry,
				cache: FlagCache::new(),
				context: RwLock::new(self.context),
				observers: ObserverSet::default(),
				init_guard: tokio::sync::Mutex::new(false),
				stream_running: AtomicBool::new(false),
				connected: AtomicBool::new(false),
				closed: AtomicBool::new(false),
				reconnect_attempts: AtomicU64::new(0),
				shutdown: CancellationToken::new(),
				task: Mutex::new(None),
			}),
		})
	}
}

/// State shared between the client handle and its stream task.
pub(crate) struct ClientInner {
	pub(crate) stream_url: Url,
	pub(crate) stream_headers: HeaderMap,
	pub(crate) streaming: bool,
	pub(crate) reconnect: ReconnectConfig,
	pub(crate) fetch_retry: RetryConfig,
	pub(crate) fetcher: Arc<dyn ConfigFetcher>,
	pub(crate) transport: Arc<dyn StreamTransport>,
	pub(crate) telemetry: SharedTelemetrySink,
	pub(crate) cache: FlagCache,
	pub(crate) context: RwLock<EvaluationContext>,
	pub(crate) observers: ObserverSet,
	init_guard: tokio::sync::Mutex<bool>,
	pub(crate) stream_running: AtomicBool,
	pub(crate) connected: AtomicBool,
	closed: AtomicBool,
	pub(crate) reconnect_attempts: AtomicU64,
	pub(crate) shutdown: CancellationToken,
	task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientInner {
	fn take_task(&self) -> Option<JoinHandle<()>> {
		self.task
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.take()
	}

	fn set_task(&self, handle: JoinHandle<()>) {
		*self
			.task
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
	}
}

/// Feature flags client for one environment.
///
/// Holds a local copy of every flag config, evaluates locally, and keeps the copy
/// current from the server's change stream. Dropping the client stops the stream.
///
/// # Example
///
/// ```ignore
/// use flagsync::{EvaluationContext, FlagsClient};
///
/// let client = FlagsClient::builder()
///     .api_key("fs_prod_xxx")
///     .base_url("https://flags.example.com")
///     .context(EvaluationContext::new().with_user_id("user-123"))
///     .build()?;
/// client.initialize().await?;
///
/// if let Some(value) = client.evaluate("checkout.new_flow", None).await {
///     println!("checkout.new_flow = {value:?}");
/// }
/// ```
pub struct FlagsClient {
	inner: Arc<ClientInner>,
}

impl FlagsClient {
	pub fn builder() -> FlagsClientBuilder {
		FlagsClientBuilder::default()
	}

	/// Loads every flag config and starts the change stream.
	///
	/// Idempotent. Concurrent calls wait for the first one and share its outcome
	/// on success; a failed attempt may be retried.
	#[instrument(skip(self))]
	pub async fn initialize(&self) -> Result<()> {
		let mut initialized = self.inner.init_guard.lock().await;
		if self.inner.closed.load(Ordering::SeqCst) {
			return Err(FlagsError::ClientClosed);
		}
		if *initialized {
			return Ok(());
		}

		let fetcher = Arc::clone(&self.inner.fetcher);
		let configs = tokio::select! {
			_ = self.inner.shutdown.cancelled() => return Err(FlagsError::ClientClosed),
			result = retry(&self.inner.fetch_retry, || fetcher.fetch_all()) => result?,
		};
		if self.inner.shutdown.is_cancelled() {
			return Err(FlagsError::ClientClosed);
		}

		let flags = configs.len();
		let touched = self.inner.cache.replace_all(configs).await;
		info!(flags, "Flag cache initialized");
		self.inner.observers.notify_all(touched, FlagChangeKind::Changed);

		if self.inner.streaming {
			self.start_stream();
		}

		*initialized = true;
		Ok(())
	}

	fn start_stream(&self) {
		if self.inner.stream_running.swap(true, Ordering::SeqCst) {
			debug!("Flag stream task already running");
			return;
		}
		let inner = Arc::clone(&self.inner);
		let handle = tokio::spawn(async move {
			run_sync_loop(Arc::clone(&inner)).await;
			inner.stream_running.store(false, Ordering::SeqCst);
		});
		self.inner.set_task(handle);
	}

	/// Evaluates a flag against the base context merged with `overrides`.
	///
	/// Returns `None` when the flag is not in the local cache.
	pub async fn evaluate(
		&self,
		flag_key: &str,
		overrides: Option<&EvaluationContext>,
	) -> Option<VariationValue> {
		self
			.evaluate_detailed(flag_key, overrides)
			.await
			.map(|detail| detail.value)
	}

	/// Like [`FlagsClient::evaluate`], with the variation id and reason.
	pub async fn evaluate_detailed(
		&self,
		flag_key: &str,
		overrides: Option<&EvaluationContext>,
	) -> Option<EvaluationDetail> {
		let config = self.inner.cache.get(flag_key).await?;
		let context = self.inner.context.read().await.merged(overrides);

		let evaluation = evaluate_detailed(&config, &context);
		let detail = EvaluationDetail {
			flag_key: flag_key.to_string(),
			variation_id: evaluation.variation.id.clone(),
			value: evaluation.variation.value.clone(),
			reason: evaluation.reason,
		};

		self.dispatch_evaluation(EvaluationTelemetry::new(
			flag_key,
			detail.variation_id.clone(),
			detail.value.clone(),
			context,
		));
		Some(detail)
	}

	fn dispatch_evaluation(&self, telemetry: EvaluationTelemetry) {
		let sink = Arc::clone(&self.inner.telemetry);
		tokio::spawn(async move {
			let flag_key = telemetry.flag_key.clone();
			if let Err(e) = sink.send_evaluation(telemetry).await {
				warn!(flag_key = %flag_key, error = %e, "Failed to send evaluation telemetry");
			}
		});
	}

	/// Merges `patch` into the base context and notifies observers for every flag.
	pub async fn set_context(&self, patch: EvaluationContext) {
		self.inner.context.write().await.merge(&patch);
		self.notify_context_changed().await;
	}

	/// Replaces the base context and notifies observers for every flag.
	pub async fn identify(&self, context: EvaluationContext) {
		*self.inner.context.write().await = context;
		self.notify_context_changed().await;
	}

	async fn notify_context_changed(&self) {
		let keys = self.inner.cache.keys().await;
		self.inner.observers.notify_all(keys, FlagChangeKind::Changed);
	}

	pub async fn context(&self) -> EvaluationContext {
		self.inner.context.read().await.clone()
	}

	/// Sends a custom event with the current base context. Does not wait.
	pub async fn track(&self, event: impl Into<String>, properties: Option<Map<String, Value>>) {
		let event = TrackedEvent::new(event, properties, self.context().await);
		let sink = Arc::clone(&self.inner.telemetry);
		tokio::spawn(async move {
			let name = event.event.clone();
			if let Err(e) = sink.send_event(event).await {
				warn!(event = %name, error = %e, "Failed to send tracked event");
			}
		});
	}

	/// Registers a callback for local flag changes.
	pub fn subscribe<F>(&self, observer: F) -> ObserverToken
	where
		F: Fn(&FlagChange) + Send + Sync + 'static,
	{
		self.inner.observers.subscribe(Arc::new(observer))
	}

	pub fn unsubscribe(&self, token: ObserverToken) -> bool {
		self.inner.observers.unsubscribe(token)
	}

	/// Stops the stream and any pending reconnect, then clears the local cache.
	///
	/// An `initialize` in flight is cancelled and returns `ClientClosed`. The
	/// client cannot be initialized again afterwards.
	pub async fn close(&self) {
		self.inner.closed.store(true, Ordering::SeqCst);
		self.inner.shutdown.cancel();
		// Waits out an in-flight initialize so it cannot repopulate the cache.
		let _init = self.inner.init_guard.lock().await;

		if let Some(handle) = self.inner.take_task() {
			handle.abort();
			let _ = handle.await;
		}
		self.inner.stream_running.store(false, Ordering::SeqCst);
		self.inner.connected.store(false, Ordering::SeqCst);
		self.inner.cache.clear().await;
		self.inner.observers.clear();
		info!("Flags client closed");
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.cache.is_initialized()
	}

	/// Whether the change stream is currently connected.
	pub fn is_connected(&self) -> bool {
		self.inner.connected.load(Ordering::SeqCst)
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	/// Number of reconnects scheduled since the stream started.
	pub fn reconnect_attempts(&self) -> u64 {
		self.inner.reconnect_attempts.load(Ordering::SeqCst)
	}

	pub async fn flag_keys(&self) -> Vec<String> {
		self.inner.cache.keys().await
	}

	pub async fn flag_count(&self) -> usize {
		self.inner.cache.len().await
	}
}

impl Drop for FlagsClient {
	fn drop(&mut self) {
		self.inner.shutdown.cancel();
		if let Some(handle) = self.inner.take_task() {
			handle.abort();
		}
	}
}

impl std::fmt::Debug for FlagsClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlagsClient")
			.field("stream_url", &self.inner.stream_url.as_str())
			.field("streaming", &self.inner.streaming)
			.field("closed", &self.is_closed())
			.finish()
	}
}
