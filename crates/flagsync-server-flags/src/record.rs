// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source-of-record shapes.
//!
//! These mirror the relational rows as stored: variation values are raw strings
//! with a type label, operators and rule kinds are unparsed labels. Turning them
//! into an evaluation-ready [`flagsync_core::FlagConfig`] is the job of
//! [`crate::materialize`].

use flagsync_core::{EnvironmentId, FlagId, ProjectId};

#[derive(Debug, Clone, PartialEq)]
pub struct VariationRecord {
	pub id: String,
	pub name: String,
	pub value: String,
	pub value_type: String,
}

/// Per-environment state of a flag.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagStateRecord {
	pub environment_id: EnvironmentId,
	pub enabled: bool,
	pub default_variation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRecord {
	pub attribute: String,
	pub operator: String,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitRecord {
	pub variation_id: String,
	pub weight: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleRecord {
	pub id: String,
	pub environment_id: EnvironmentId,
	pub order: u32,
	pub kind: String,
	pub conditions: Vec<ConditionRecord>,
	pub rollout_percentage: Option<u32>,
	pub target_variation_id: Option<String>,
	pub distribution: Vec<SplitRecord>,
}

/// A flag as loaded from the source of record, with its environment states and rules.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagRecord {
	pub id: FlagId,
	pub project_id: ProjectId,
	pub key: String,
	pub variations: Vec<VariationRecord>,
	pub states: Vec<FlagStateRecord>,
	pub rules: Vec<RuleRecord>,
}

impl FlagRecord {
	pub fn state_for(&self, environment_id: EnvironmentId) -> Option<&FlagStateRecord> {
		self.states
			.iter()
			.find(|s| s.environment_id == environment_id)
	}

	pub fn rules_for(&self, environment_id: EnvironmentId) -> impl Iterator<Item = &RuleRecord> {
		self.rules
			.iter()
			.filter(move |r| r.environment_id == environment_id)
	}
}
