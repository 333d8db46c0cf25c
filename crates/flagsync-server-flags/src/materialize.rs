// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Conversion of source-of-record rows into evaluation-ready configs.

use std::collections::HashSet;

use tracing::warn;

use flagsync_core::{
	Condition, ConditionOperator, EngineRule, EnvironmentId, FlagConfig, FlagVariation, RuleKind,
	Split, VariationType, VariationValue,
};

use crate::record::{FlagRecord, RuleRecord, VariationRecord};

/// Outcome of materializing a flag for one environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
	/// A valid config that may be cached and served.
	Config(FlagConfig),
	/// The flag has no state in this environment.
	NotConfigured,
	/// The rows do not form a valid config. Treated as absent.
	Invalid(String),
}

impl Materialized {
	pub fn into_config(self) -> Option<FlagConfig> {
		match self {
			Self::Config(config) => Some(config),
			_ => None,
		}
	}
}

/// Builds the [`FlagConfig`] of `record` for `environment_id`.
///
/// Variations whose raw value does not parse under their declared type are
/// discarded with a warning. The result is invalid when the default variation
/// or any rule-referenced variation is missing after that step.
pub fn materialize(record: &FlagRecord, environment_id: EnvironmentId) -> Materialized {
	let Some(state) = record.state_for(environment_id) else {
		return Materialized::NotConfigured;
	};

	let variations: Vec<FlagVariation> = record
		.variations
		.iter()
		.filter_map(|v| parse_variation(&record.key, v))
		.collect();

	let Some(default_variation) = variations
		.iter()
		.find(|v| v.id == state.default_variation_id)
		.cloned()
	else {
		return Materialized::Invalid(format!(
			"default variation {} missing or unparsable",
			state.default_variation_id
		));
	};

	let known: HashSet<&str> = variations.iter().map(|v| v.id.as_str()).collect();

	let mut rule_records: Vec<&RuleRecord> = record.rules_for(environment_id).collect();
	rule_records.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));

	let mut rules = Vec::with_capacity(rule_records.len());
	for rule in rule_records {
		match build_rule(&record.key, rule, &known) {
			Ok(rule) => rules.push(rule),
			Err(reason) => return Materialized::Invalid(reason),
		}
	}

	let config = FlagConfig {
		key: record.key.clone(),
		enabled: state.enabled,
		default_variation,
		variations,
		rules,
	};

	match config.validate() {
		Ok(()) => Materialized::Config(config),
		Err(e) => Materialized::Invalid(e.to_string()),
	}
}

fn parse_variation(flag_key: &str, record: &VariationRecord) -> Option<FlagVariation> {
	let Some(kind) = VariationType::from_label(&record.value_type) else {
		warn!(
			flag_key = %flag_key,
			variation_id = %record.id,
			value_type = %record.value_type,
			"Discarding variation with unknown type"
		);
		return None;
	};

	let Some(value) = VariationValue::parse(&record.value, kind) else {
		warn!(
			flag_key = %flag_key,
			variation_id = %record.id,
			value_type = %kind,
			"Discarding variation with unparsable value"
		);
		return None;
	};

	Some(FlagVariation {
		id: record.id.clone(),
		name: record.name.clone(),
		value,
		kind,
	})
}

fn build_rule(
	flag_key: &str,
	record: &RuleRecord,
	known: &HashSet<&str>,
) -> std::result::Result<EngineRule, String> {
	let kind = RuleKind::from_label(&record.kind)
		.ok_or_else(|| format!("rule {} has unknown kind {}", record.id, record.kind))?;

	let conditions = record
		.conditions
		.iter()
		.map(|c| {
			let operator = ConditionOperator::from_label(&c.operator);
			if operator.is_unknown() {
				warn!(
					flag_key = %flag_key,
					rule_id = %record.id,
					operator = %c.operator,
					"Unknown condition operator; condition will never match"
				);
			}
			Condition {
				attribute: c.attribute.clone(),
				operator,
				value: c.value.clone(),
			}
		})
		.collect();

	let mut rule = EngineRule {
		id: record.id.clone(),
		order: record.order,
		kind,
		conditions,
		rollout_percentage: None,
		target_variation_id: None,
		distribution: None,
	};

	match kind {
		RuleKind::Targeting => {
			if let Some(target) = &record.target_variation_id {
				if !known.contains(target.as_str()) {
					return Err(format!(
						"rule {} targets missing variation {}",
						record.id, target
					));
				}
			}
			rule.rollout_percentage = record.rollout_percentage;
			rule.target_variation_id = record.target_variation_id.clone();
		}
		RuleKind::Experiment => {
			let mut splits = Vec::with_capacity(record.distribution.len());
			for split in &record.distribution {
				if !known.contains(split.variation_id.as_str()) {
					return Err(format!(
						"rule {} distributes to missing variation {}",
						record.id, split.variation_id
					));
				}
				splits.push(Split {
					variation_id: split.variation_id.clone(),
					weight: split.weight,
				});
			}
			rule.distribution = Some(splits);
		}
	}

	Ok(rule)
}
