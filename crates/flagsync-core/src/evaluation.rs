// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag evaluation engine.
//!
//! Evaluation is a pure function of a [`FlagConfig`] and an [`EvaluationContext`]:
//! no I/O, no shared state, safe to call from any number of threads. The same
//! inputs yield the same variation in every process, which lets the server and
//! the SDKs evaluate interchangeably.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::context::EvaluationContext;
use crate::flag::{FlagConfig, FlagVariation};
use crate::rule::{Condition, ConditionOperator, EngineRule, RuleKind};

/// Number of buckets used for percentage assignment.
pub const BUCKET_COUNT: u32 = 100;

/// Why an evaluation resolved the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EvaluationReason {
	/// Flag is disabled; the default variation was served without consulting rules.
	Disabled,
	/// A rule matched and produced the variation.
	#[serde(rename_all = "camelCase")]
	RuleMatch { rule_id: String },
	/// No rule produced a result.
	Default,
}

/// A resolved variation together with the reason it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<'a> {
	pub variation: &'a FlagVariation,
	pub reason: EvaluationReason,
}

/// Computes the stable bucket in `[0, 100)` for a bucketing identifier.
///
/// The bucket is the first four bytes of the SHA-256 digest read as a big-endian
/// `u32`, modulo 100.
pub fn bucket(bucketing_id: &str) -> u32 {
	let digest = Sha256::digest(bucketing_id.as_bytes());
	let prefix = [digest[0], digest[1], digest[2], digest[3]];
	u32::from_be_bytes(prefix) % BUCKET_COUNT
}

/// Evaluates a flag for a context and returns the resolved variation.
pub fn evaluate<'a>(config: &'a FlagConfig, context: &EvaluationContext) -> &'a FlagVariation {
	evaluate_detailed(config, context).variation
}

/// Evaluates a flag for a context.
///
/// 1. A disabled flag returns the default variation immediately.
/// 2. Rules are walked in stored order; the first rule whose conditions all
///    match is resolved. A rule that resolves to nothing (bucket outside the
///    rollout, or outside the experiment's distribution) falls through.
/// 3. If no rule produces a variation, the default variation is returned.
pub fn evaluate_detailed<'a>(config: &'a FlagConfig, context: &EvaluationContext) -> Evaluation<'a> {
	if !config.enabled {
		return Evaluation {
			variation: &config.default_variation,
			reason: EvaluationReason::Disabled,
		};
	}

	for rule in &config.rules {
		if !conditions_match(&rule.conditions, context) {
			continue;
		}

		if let Some(variation) = resolve_rule(config, rule, context) {
			return Evaluation {
				variation,
				reason: EvaluationReason::RuleMatch {
					rule_id: rule.id.clone(),
				},
			};
		}
	}

	Evaluation {
		variation: &config.default_variation,
		reason: EvaluationReason::Default,
	}
}

fn resolve_rule<'a>(
	config: &'a FlagConfig,
	rule: &EngineRule,
	context: &EvaluationContext,
) -> Option<&'a FlagVariation> {
	let bucketing_id = context
		.bucketing_id()
		.unwrap_or_else(|| rule.id.clone());
	let bucket = bucket(&bucketing_id);

	match rule.kind {
		RuleKind::Targeting => {
			let rollout = rule.rollout_percentage.unwrap_or(BUCKET_COUNT);
			if bucket >= rollout {
				return None;
			}
			Some(
				rule
					.target_variation_id
					.as_deref()
					.and_then(|id| config.variation(id))
					.unwrap_or(&config.default_variation),
			)
		}
		RuleKind::Experiment => {
			let mut cumulative: u32 = 0;
			for split in rule.distribution.iter().flatten() {
				cumulative = cumulative.saturating_add(split.weight);
				if bucket < cumulative {
					return Some(
						config
							.variation(&split.variation_id)
							.unwrap_or(&config.default_variation),
					);
				}
			}
			None
		}
	}
}

/// Evaluates a condition list as a logical AND. An empty list always matches.
pub fn conditions_match(conditions: &[Condition], context: &EvaluationContext) -> bool {
	conditions.iter().all(|c| condition_matches(c, context))
}

/// Evaluates one condition. Missing attributes, unparsable numbers and unknown
/// operators all yield `false`.
pub fn condition_matches(condition: &Condition, context: &EvaluationContext) -> bool {
	let Some(actual) = context.attribute_string(&condition.attribute) else {
		return false;
	};
	let expected = condition.value.as_str();

	match condition.operator {
		ConditionOperator::Equals => loosely_equal(&actual, expected),
		ConditionOperator::NotEquals => !loosely_equal(&actual, expected),
		ConditionOperator::GreaterThan => compare_numbers(&actual, expected, |a, b| a > b),
		ConditionOperator::GreaterThanOrEqual => compare_numbers(&actual, expected, |a, b| a >= b),
		ConditionOperator::LessThan => compare_numbers(&actual, expected, |a, b| a < b),
		ConditionOperator::LessThanOrEqual => compare_numbers(&actual, expected, |a, b| a <= b),
		ConditionOperator::Contains => actual.to_lowercase().contains(&expected.to_lowercase()),
		ConditionOperator::StartsWith => actual
			.to_lowercase()
			.starts_with(&expected.to_lowercase()),
		ConditionOperator::EndsWith => actual.to_lowercase().ends_with(&expected.to_lowercase()),
		ConditionOperator::In => in_list(&actual, expected),
		ConditionOperator::Unknown => false,
	}
}

fn parse_number(s: &str) -> Option<f64> {
	s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn compare_numbers(actual: &str, expected: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
	match (parse_number(actual), parse_number(expected)) {
		(Some(a), Some(b)) => cmp(a, b),
		_ => false,
	}
}

fn loosely_equal(actual: &str, expected: &str) -> bool {
	match (parse_number(actual), parse_number(expected)) {
		(Some(a), Some(b)) => a == b,
		_ => actual.to_lowercase() == expected.to_lowercase(),
	}
}

fn in_list(actual: &str, list: &str) -> bool {
	let items: Vec<&str> = list
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.collect();

	if let Some(a) = parse_number(actual) {
		if items.iter().filter_map(|i| parse_number(i)).any(|b| a == b) {
			return true;
		}
	}

	let actual = actual.to_lowercase();
	items.iter().any(|item| item.to_lowercase() == actual)
}
