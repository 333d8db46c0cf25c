// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
	#[serde(alias = "==", alias = "eq")]
	Equals,
	#[serde(alias = "!=", alias = "neq")]
	NotEquals,
	#[serde(alias = ">", alias = "gt")]
	GreaterThan,
	#[serde(alias = ">=", alias = "gte")]
	GreaterThanOrEqual,
	#[serde(alias = "<", alias = "lt")]
	LessThan,
	#[serde(alias = "<=", alias = "lte")]
	LessThanOrEqual,
	Contains,
	StartsWith,
	EndsWith,
	In,
	/// Any label this version does not understand. Never matches.
	#[serde(other)]
	Unknown,
}

impl ConditionOperator {
	/// Parses a stored operator label, case-insensitively.
	pub fn from_label(label: &str) -> Self {
		match label.trim().to_ascii_lowercase().as_str() {
			"equals" | "eq" | "==" => Self::Equals,
			"notequals" | "not_equals" | "neq" | "!=" => Self::NotEquals,
			"greaterthan" | "greater_than" | "gt" | ">" => Self::GreaterThan,
			"greaterthanorequal" | "greater_than_or_equal" | "gte" | ">=" => Self::GreaterThanOrEqual,
			"lessthan" | "less_than" | "lt" | "<" => Self::LessThan,
			"lessthanorequal" | "less_than_or_equal" | "lte" | "<=" => Self::LessThanOrEqual,
			"contains" => Self::Contains,
			"startswith" | "starts_with" => Self::StartsWith,
			"endswith" | "ends_with" => Self::EndsWith,
			"in" => Self::In,
			_ => Self::Unknown,
		}
	}

	pub fn is_unknown(&self) -> bool {
		matches!(self, Self::Unknown)
	}
}

/// A single predicate against one context attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
	/// Dotted path into the evaluation context, e.g. `user.country`.
	pub attribute: String,
	pub operator: ConditionOperator,
	pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
	/// Serves one fixed variation to a percentage of matching traffic.
	Targeting,
	/// Splits matching traffic across variations by weight.
	Experiment,
}

impl RuleKind {
	pub fn from_label(label: &str) -> Option<Self> {
		match label.trim().to_ascii_lowercase().as_str() {
			"targeting" => Some(Self::Targeting),
			"experiment" => Some(Self::Experiment),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Targeting => "targeting",
			Self::Experiment => "experiment",
		}
	}
}

/// One arm of an experiment distribution. Weights are percentages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
	pub variation_id: String,
	pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRule {
	pub id: String,
	pub order: u32,
	pub kind: RuleKind,
	#[serde(default)]
	pub conditions: Vec<Condition>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rollout_percentage: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target_variation_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub distribution: Option<Vec<Split>>,
}

/// Sorts rules by `(order, id)` and rewrites their orders to `0..N-1`.
pub fn normalize_rule_orders(rules: &mut [EngineRule]) {
	rules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
	for (index, rule) in rules.iter_mut().enumerate() {
		rule.order = index as u32;
	}
}

/// Returns true if `orders`, in any sequence, are exactly `0..N-1`.
pub fn orders_are_dense(orders: &[u32]) -> bool {
	let mut sorted = orders.to_vec();
	sorted.sort_unstable();
	sorted.iter().enumerate().all(|(i, o)| *o == i as u32)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn rule(id: &str, order: u32) -> EngineRule {
		EngineRule {
			id: id.to_string(),
			order,
			kind: RuleKind::Targeting,
			conditions: vec![],
			rollout_percentage: None,
			target_variation_id: Some("on".to_string()),
			distribution: None,
		}
	}

	#[test]
	fn test_operator_aliases_deserialize() {
		let op: ConditionOperator = serde_json::from_str("\">=\"").unwrap();
		assert_eq!(op, ConditionOperator::GreaterThanOrEqual);
		let op: ConditionOperator = serde_json::from_str("\"startsWith\"").unwrap();
		assert_eq!(op, ConditionOperator::StartsWith);
	}

	#[test]
	fn test_garbage_operator_deserializes_to_unknown() {
		let cond: Condition =
			serde_json::from_str(r#"{"attribute":"a","operator":"matchesRegex","value":"x"}"#)
				.unwrap();
		assert!(cond.operator.is_unknown());
	}

	#[test]
	fn test_from_label_is_case_insensitive() {
		assert_eq!(ConditionOperator::from_label("IN"), ConditionOperator::In);
		assert_eq!(
			ConditionOperator::from_label("StartsWith"),
			ConditionOperator::StartsWith
		);
		assert_eq!(ConditionOperator::from_label("~="), ConditionOperator::Unknown);
	}

	#[test]
	fn test_rule_kind_labels() {
		assert_eq!(RuleKind::from_label("Experiment"), Some(RuleKind::Experiment));
		assert_eq!(RuleKind::from_label("holdout"), None);
	}

	#[test]
	fn test_rule_omits_unused_fields() {
		let json = serde_json::to_value(rule("r1", 0)).unwrap();
		assert!(json.get("distribution").is_none());
		assert!(json.get("rolloutPercentage").is_none());
		assert_eq!(json["targetVariationId"], "on");
	}

	#[test]
	fn test_normalize_closes_gaps() {
		let mut rules = vec![rule("c", 7), rule("a", 2), rule("b", 2)];
		normalize_rule_orders(&mut rules);
		let ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
		assert_eq!(ids, vec!["a", "b", "c"]);
		let orders: Vec<_> = rules.iter().map(|r| r.order).collect();
		assert_eq!(orders, vec![0, 1, 2]);
	}

	#[test]
	fn test_orders_are_dense() {
		assert!(orders_are_dense(&[]));
		assert!(orders_are_dense(&[2, 0, 1]));
		assert!(!orders_are_dense(&[0, 2]));
		assert!(!orders_are_dense(&[0, 0, 1]));
	}

	proptest! {
		#[test]
		fn normalize_always_yields_dense_orders(orders in prop::collection::vec(0u32..1000, 0..30)) {
			let mut rules: Vec<_> = orders
				.iter()
				.enumerate()
				.map(|(i, o)| rule(&format!("r{i}"), *o))
				.collect();
			normalize_rule_orders(&mut rules);
			let normalized: Vec<u32> = rules.iter().map(|r| r.order).collect();
			prop_assert!(orders_are_dense(&normalized));
		}

		#[test]
		fn normalize_preserves_relative_order(orders in prop::collection::vec(0u32..1000, 2..30)) {
			let mut rules: Vec<_> = orders
				.iter()
				.enumerate()
				.map(|(i, o)| rule(&format!("r{i:03}"), *o))
				.collect();
			let original = rules.clone();
			normalize_rule_orders(&mut rules);
			for pair in rules.windows(2) {
				let a = original.iter().find(|r| r.id == pair[0].id).unwrap();
				let b = original.iter().find(|r| r.id == pair[1].id).unwrap();
				prop_assert!(a.order <= b.order);
			}
		}
	}
}
