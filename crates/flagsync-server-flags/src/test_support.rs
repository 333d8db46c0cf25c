// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePoolOptions;

use flagsync_core::{EnvironmentId, FlagId, ProjectId};

use crate::record::{RuleRecord, VariationRecord};
use crate::repository::{run_migrations, SqliteFlagSource};

pub struct Seed {
	pub source: SqliteFlagSource,
	pub project_id: ProjectId,
	pub environment_id: EnvironmentId,
	pub api_key: String,
}

/// A migrated in-memory source with one project, one environment and one API key.
pub async fn seeded_source() -> Seed {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect("sqlite::memory:")
		.await
		.unwrap();
	run_migrations(&pool).await.unwrap();

	let source = SqliteFlagSource::new(pool);
	let project_id = source.create_project("acme").await.unwrap();
	let environment_id = source
		.create_environment(project_id, "production")
		.await
		.unwrap();
	let api_key = "fs_test_production".to_string();
	source.create_api_key(environment_id, &api_key).await.unwrap();

	Seed {
		source,
		project_id,
		environment_id,
		api_key,
	}
}

/// Creates a flag with boolean variations `off` and `on`.
pub async fn boolean_flag(source: &SqliteFlagSource, project_id: ProjectId, key: &str) -> FlagId {
	let variations = [
		VariationRecord {
			id: "off".to_string(),
			name: "Off".to_string(),
			value: "false".to_string(),
			value_type: "boolean".to_string(),
		},
		VariationRecord {
			id: "on".to_string(),
			name: "On".to_string(),
			value: "true".to_string(),
			value_type: "boolean".to_string(),
		},
	];
	source.create_flag(project_id, key, &variations).await.unwrap()
}

/// A full-rollout targeting rule with no conditions.
pub fn targeting_rule(id: &str, environment_id: EnvironmentId, target: &str) -> RuleRecord {
	RuleRecord {
		id: id.to_string(),
		environment_id,
		order: 0,
		kind: "targeting".to_string(),
		conditions: vec![],
		rollout_percentage: Some(100),
		target_variation_id: Some(target.to_string()),
		distribution: vec![],
	}
}
