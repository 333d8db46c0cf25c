// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the flagsync feature flags pipeline.
//!
//! This crate provides the flag data model, the evaluation engine, and the
//! message shapes that flow between the config store, the update propagator and
//! client SDKs. It is shared by the server (`flagsync-server-flags`) and the
//! client SDK (`flagsync`) so both evaluate flags identically.
//!
//! # Example
//!
//! ```
//! use flagsync_core::{
//!     evaluate, EngineRule, EvaluationContext, FlagConfig, FlagVariation, RuleKind,
//!     VariationType, VariationValue,
//! };
//!
//! let off = FlagVariation {
//!     id: "off".into(),
//!     name: "Off".into(),
//!     value: VariationValue::Bool(false),
//!     kind: VariationType::Boolean,
//! };
//! let on = FlagVariation {
//!     id: "on".into(),
//!     name: "On".into(),
//!     value: VariationValue::Bool(true),
//!     kind: VariationType::Boolean,
//! };
//! let config = FlagConfig {
//!     key: "checkout.new_flow".into(),
//!     enabled: true,
//!     default_variation: off.clone(),
//!     variations: vec![off, on],
//!     rules: vec![EngineRule {
//!         id: "everyone".into(),
//!         order: 0,
//!         kind: RuleKind::Targeting,
//!         conditions: vec![],
//!         rollout_percentage: Some(100),
//!         target_variation_id: Some("on".into()),
//!         distribution: None,
//!     }],
//! };
//!
//! let ctx = EvaluationContext::new().with_user_id("user123");
//! assert_eq!(evaluate(&config, &ctx).value, VariationValue::Bool(true));
//! ```

pub mod context;
pub mod environment;
pub mod error;
pub mod evaluation;
pub mod flag;
pub mod keys;
pub mod rule;
pub mod sse;
pub mod telemetry;

pub use context::EvaluationContext;
pub use environment::{EnvironmentId, EnvironmentIdentity, FlagId, ProjectId};
pub use error::{FlagsError, Result};
pub use evaluation::{
	bucket, condition_matches, conditions_match, evaluate, evaluate_detailed, Evaluation,
	EvaluationReason, BUCKET_COUNT,
};
pub use flag::{FlagConfig, FlagVariation, VariationType, VariationValue};
pub use keys::{api_key_cache_key, config_cache_key, API_KEY_TTL_SECS};
pub use rule::{
	normalize_rule_orders, orders_are_dense, Condition, ConditionOperator, EngineRule, RuleKind,
	Split,
};
pub use sse::{
	ChangeType, FlagStreamEvent, FlagUpdateData, InvalidationMessage, EVENT_CONNECTED,
	EVENT_FLAG_UPDATE,
};
pub use telemetry::{EvaluationTelemetry, TrackedEvent};

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use serde_json::json;

	fn scenario_config(enabled: bool, rules: Vec<EngineRule>) -> FlagConfig {
		let off = FlagVariation {
			id: "off".to_string(),
			name: "Off".to_string(),
			value: VariationValue::Bool(false),
			kind: VariationType::Boolean,
		};
		let on = FlagVariation {
			id: "on".to_string(),
			name: "On".to_string(),
			value: VariationValue::Bool(true),
			kind: VariationType::Boolean,
		};
		FlagConfig {
			key: "scenario".to_string(),
			enabled,
			default_variation: off.clone(),
			variations: vec![off, on],
			rules,
		}
	}

	fn country_rule() -> EngineRule {
		EngineRule {
			id: "north-america".to_string(),
			order: 0,
			kind: RuleKind::Targeting,
			conditions: vec![Condition {
				attribute: "user.country".to_string(),
				operator: ConditionOperator::In,
				value: "US,CA".to_string(),
			}],
			rollout_percentage: Some(100),
			target_variation_id: Some("on".to_string()),
			distribution: None,
		}
	}

	#[test]
	fn test_country_targeting_end_to_end() {
		let config = scenario_config(true, vec![country_rule()]);
		let ctx = EvaluationContext::from_value(json!({"user": {"country": "ca"}})).unwrap();
		assert_eq!(evaluate(&config, &ctx).value, VariationValue::Bool(true));
	}

	#[test]
	fn test_config_survives_json_transport() {
		let config = scenario_config(true, vec![country_rule()]);
		let wire = serde_json::to_string(&config).unwrap();
		let received: FlagConfig = serde_json::from_str(&wire).unwrap();
		assert_eq!(received, config);
		assert!(received.is_valid());
	}

	// Property-based tests for server/client evaluation parity
	proptest! {
		#[test]
		fn transported_config_evaluates_identically(
			user_id in "[a-z0-9]{1,16}",
			country in prop_oneof![Just("US"), Just("ca"), Just("FR")],
			enabled in proptest::bool::ANY,
		) {
			let config = scenario_config(enabled, vec![country_rule()]);
			let received: FlagConfig =
				serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
			let ctx = EvaluationContext::from_value(
				json!({"user": {"id": user_id, "country": country}}),
			)
			.unwrap();
			prop_assert_eq!(evaluate(&config, &ctx), evaluate(&received, &ctx));
		}

		#[test]
		fn scenario_disabled_flag_is_false_for_any_context(
			user_id in "[a-z0-9]{0,16}",
			session in "[a-z0-9]{0,16}",
		) {
			let config = scenario_config(false, vec![country_rule()]);
			let ctx = EvaluationContext::from_value(
				json!({"user": {"id": user_id, "country": "US"}, "sessionId": session}),
			)
			.unwrap();
			prop_assert_eq!(&evaluate(&config, &ctx).value, &VariationValue::Bool(false));
		}
	}
}
