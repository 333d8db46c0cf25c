// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change observers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

/// What happened to a flag in the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagChangeKind {
	/// The flag's config or the evaluation context changed; re-evaluate.
	Changed,
	/// The flag is no longer available.
	Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagChange {
	pub flag_key: String,
	pub kind: FlagChangeKind,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

pub type Observer = Arc<dyn Fn(&FlagChange) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ObserverSet {
	next_token: AtomicU64,
	observers: DashMap<ObserverToken, Observer>,
}

impl ObserverSet {
	pub(crate) fn subscribe(&self, observer: Observer) -> ObserverToken {
		let token = ObserverToken(self.next_token.fetch_add(1, Ordering::Relaxed));
		self.observers.insert(token, observer);
		token
	}

	pub(crate) fn unsubscribe(&self, token: ObserverToken) -> bool {
		self.observers.remove(&token).is_some()
	}

	pub(crate) fn len(&self) -> usize {
		self.observers.len()
	}

	/// Calls every observer. Callbacks run outside the map's locks so they may
	/// subscribe or unsubscribe.
	pub(crate) fn notify(&self, change: &FlagChange) {
		let observers: Vec<Observer> = self
			.observers
			.iter()
			.map(|entry| Arc::clone(entry.value()))
			.collect();
		for observer in observers {
			observer(change);
		}
	}

	pub(crate) fn notify_all<I>(&self, flag_keys: I, kind: FlagChangeKind)
	where
		I: IntoIterator<Item = String>,
	{
		for flag_key in flag_keys {
			self.notify(&FlagChange { flag_key, kind });
		}
	}

	pub(crate) fn clear(&self) {
		self.observers.clear();
	}
}

impl std::fmt::Debug for ObserverSet {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ObserverSet")
			.field("observers", &self.observers.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	fn recorder() -> (Observer, Arc<Mutex<Vec<FlagChange>>>) {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let observer: Observer = Arc::new(move |change: &FlagChange| {
			sink.lock().unwrap().push(change.clone());
		});
		(observer, seen)
	}

	#[test]
	fn test_subscribe_notify_unsubscribe() {
		let set = ObserverSet::default();
		let (observer, seen) = recorder();
		let token = set.subscribe(observer);

		set.notify_all(
			vec!["a".to_string(), "b".to_string()],
			FlagChangeKind::Changed,
		);
		assert_eq!(seen.lock().unwrap().len(), 2);

		assert!(set.unsubscribe(token));
		assert!(!set.unsubscribe(token));
		set.notify(&FlagChange {
			flag_key: "a".to_string(),
			kind: FlagChangeKind::Removed,
		});
		assert_eq!(seen.lock().unwrap().len(), 2);
	}

	#[test]
	fn test_tokens_are_distinct() {
		let set = ObserverSet::default();
		let (a, _) = recorder();
		let (b, _) = recorder();
		assert_ne!(set.subscribe(a), set.subscribe(b));
		assert_eq!(set.len(), 2);
	}

	#[test]
	fn test_observer_may_unsubscribe_itself() {
		let set = Arc::new(ObserverSet::default());
		let token_slot: Arc<Mutex<Option<ObserverToken>>> = Arc::new(Mutex::new(None));

		let set_ref = Arc::clone(&set);
		let slot = Arc::clone(&token_slot);
		let token = set.subscribe(Arc::new(move |_change: &FlagChange| {
			if let Some(token) = *slot.lock().unwrap() {
				set_ref.unsubscribe(token);
			}
		}));
		*token_slot.lock().unwrap() = Some(token);

		set.notify(&FlagChange {
			flag_key: "a".to_string(),
			kind: FlagChangeKind::Changed,
		});
		assert_eq!(set.len(), 0);
	}
}
