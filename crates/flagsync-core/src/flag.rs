// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::rule::{EngineRule, RuleKind};
use crate::{FlagsError, Result};

/// Declared type of a variation's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationType {
	Boolean,
	String,
	Number,
}

impl VariationType {
	/// Parses a stored type label. Unknown labels return `None`.
	pub fn from_label(label: &str) -> Option<Self> {
		match label.trim().to_ascii_lowercase().as_str() {
			"boolean" | "bool" => Some(Self::Boolean),
			"string" => Some(Self::String),
			"number" => Some(Self::Number),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Boolean => "boolean",
			Self::String => "string",
			Self::Number => "number",
		}
	}
}

impl std::fmt::Display for VariationType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A variation's typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariationValue {
	Bool(bool),
	Number(f64),
	String(String),
}

impl VariationValue {
	/// Parses a raw stored value according to its declared type.
	///
	/// Returns `None` when the raw text is not a valid value of that type.
	pub fn parse(raw: &str, kind: VariationType) -> Option<Self> {
		match kind {
			VariationType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
				"true" => Some(Self::Bool(true)),
				"false" => Some(Self::Bool(false)),
				_ => None,
			},
			VariationType::Number => raw
				.trim()
				.parse::<f64>()
				.ok()
				.filter(|n| n.is_finite())
				.map(Self::Number),
			VariationType::String => Some(Self::String(raw.to_string())),
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Self::Bool(b) => serde_json::Value::Bool(*b),
			Self::Number(n) => serde_json::Number::from_f64(*n)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			Self::String(s) => serde_json::Value::String(s.clone()),
		}
	}
}

/// One possible value a flag can resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagVariation {
	pub id: String,
	pub name: String,
	pub value: VariationValue,
	#[serde(rename = "type")]
	pub kind: VariationType,
}

/// Evaluation-ready configuration of one flag in one environment.
///
/// This is the unit of caching and the unit of evaluation input. Instances are
/// derived from source-of-record rows and replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagConfig {
	pub key: String,
	pub enabled: bool,
	pub default_variation: FlagVariation,
	pub variations: Vec<FlagVariation>,
	#[serde(default)]
	pub rules: Vec<EngineRule>,
}

impl FlagConfig {
	/// Looks up a variation by id.
	pub fn variation(&self, id: &str) -> Option<&FlagVariation> {
		self.variations.iter().find(|v| v.id == id)
	}

	/// Checks the referential invariant: the default variation and every variation
	/// referenced by a rule must exist in `variations`.
	pub fn validate(&self) -> Result<()> {
		if self.variation(&self.default_variation.id).is_none() {
			return Err(FlagsError::DefaultVariationMissing(
				self.default_variation.id.clone(),
			));
		}

		for rule in &self.rules {
			let referenced: Vec<&str> = match rule.kind {
				RuleKind::Targeting => rule.target_variation_id.iter().map(String::as_str).collect(),
				RuleKind::Experiment => rule
					.distribution
					.iter()
					.flatten()
					.map(|s| s.variation_id.as_str())
					.collect(),
			};

			for variation_id in referenced {
				if self.variation(variation_id).is_none() {
					return Err(FlagsError::UnknownVariation {
						rule_id: rule.id.clone(),
						variation_id: variation_id.to_string(),
					});
				}
			}
		}

		Ok(())
	}

	/// Returns true if the config satisfies [`FlagConfig::validate`].
	pub fn is_valid(&self) -> bool {
		self.validate().is_ok()
	}
}
