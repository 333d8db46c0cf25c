// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open attribute bag a flag is evaluated against.
///
/// Attributes are arbitrary nested JSON and are addressed by dotted paths such as
/// `user.country`. No schema is enforced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationContext {
	attributes: Map<String, Value>,
}

impl EvaluationContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a context from a JSON value. Non-object values yield `None`.
	pub fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::Object(attributes) => Some(Self { attributes }),
			_ => None,
		}
	}

	/// Sets a top-level attribute.
	pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
		self.attributes.insert(key.into(), value);
		self
	}

	/// Sets `user.id`, creating the `user` object if needed.
	pub fn with_user_id(self, user_id: impl Into<String>) -> Self {
		let mut patch = Map::new();
		patch.insert("id".to_string(), Value::String(user_id.into()));
		let mut ctx = self;
		ctx.merge(&EvaluationContext::new().with("user", Value::Object(patch)));
		ctx
	}

	pub fn with_session_id(self, session_id: impl Into<String>) -> Self {
		self.with("sessionId", Value::String(session_id.into()))
	}

	pub fn is_empty(&self) -> bool {
		self.attributes.is_empty()
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.attributes
	}

	/// Resolves a dotted path to a value.
	pub fn lookup(&self, path: &str) -> Option<&Value> {
		let mut segments = path.split('.');
		let mut current = self.attributes.get(segments.next()?)?;
		for segment in segments {
			current = current.as_object()?.get(segment)?;
		}
		Some(current)
	}

	/// Resolves a dotted path to a comparable string.
	///
	/// Strings are returned as-is, numbers and booleans are rendered. Null, arrays
	/// and objects count as missing.
	pub fn attribute_string(&self, path: &str) -> Option<String> {
		match self.lookup(path)? {
			Value::String(s) => Some(s.clone()),
			Value::Number(n) => Some(n.to_string()),
			Value::Bool(b) => Some(b.to_string()),
			_ => None,
		}
	}

	/// The identifier used for percentage bucketing: `user.id`, else `sessionId`.
	pub fn bucketing_id(&self) -> Option<String> {
		self
			.attribute_string("user.id")
			.filter(|s| !s.is_empty())
			.or_else(|| self.attribute_string("sessionId").filter(|s| !s.is_empty()))
	}

	/// Deep-merges `patch` into this context. Objects merge key by key; anything
	/// else in `patch` replaces the existing value.
	pub fn merge(&mut self, patch: &EvaluationContext) {
		for (key, value) in &patch.attributes {
			merge_value(self.attributes.entry(key.clone()).or_insert(Value::Null), value);
		}
	}

	/// Returns a copy of this context with `overrides` merged on top.
	pub fn merged(&self, overrides: Option<&EvaluationContext>) -> EvaluationContext {
		let mut ctx = self.clone();
		if let Some(overrides) = overrides {
			ctx.merge(overrides);
		}
		ctx
	}
}

fn merge_value(target: &mut Value, patch: &Value) {
	match (target, patch) {
		(Value::Object(target), Value::Object(patch)) => {
			for (key, value) in patch {
				merge_value(target.entry(key.clone()).or_insert(Value::Null), value);
			}
		}
		(target, patch) => *target = patch.clone(),
	}
}

impl From<Map<String, Value>> for EvaluationContext {
	fn from(attributes: Map<String, Value>) -> Self {
		Self { attributes }
	}
}
