// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use flagsync_core::{EnvironmentId, EnvironmentIdentity, FlagId, ProjectId};

use crate::error::{FlagsServerError, Result};
use crate::record::{
	ConditionRecord, FlagRecord, FlagStateRecord, RuleRecord, SplitRecord, VariationRecord,
};

/// Read access to the source of record.
///
/// The config store only ever reads through this trait. Authoring writes live on
/// the concrete repository and are followed by a call into
/// [`crate::ConfigSync`].
#[async_trait]
pub trait FlagSource: Send + Sync {
	/// Loads a flag by key, with its state and rules for one environment.
	///
	/// Returns `None` when the environment's project has no flag with that key.
	async fn load_flag(
		&self,
		environment_id: EnvironmentId,
		flag_key: &str,
	) -> Result<Option<FlagRecord>>;

	/// Lists the keys of every flag that has state in the environment.
	async fn list_flag_keys(&self, environment_id: EnvironmentId) -> Result<Vec<String>>;

	async fn resolve_api_key(&self, api_key: &str) -> Result<Option<EnvironmentIdentity>>;

	async fn project_of_environment(
		&self,
		environment_id: EnvironmentId,
	) -> Result<Option<ProjectId>>;

	async fn list_environments(&self, project_id: ProjectId) -> Result<Vec<EnvironmentId>>;
}

/// Applies the flag schema to a pool. Statements are idempotent.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	let m1 = include_str!("../migrations/001_flags.sql");
	for stmt in m1.split(';').filter(|s| !s.trim().is_empty()) {
		sqlx::query(stmt).execute(pool).await?;
	}
	debug!("flag schema migrated");
	Ok(())
}

/// SQLite implementation of the source of record.
#[derive(Clone)]
pub struct SqliteFlagSource {
	pool: SqlitePool,
}

impl SqliteFlagSource {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

#[async_trait]
impl FlagSource for SqliteFlagSource {
	#[instrument(skip(self), fields(environment_id = %environment_id, flag_key = %flag_key))]
	async fn load_flag(
		&self,
		environment_id: EnvironmentId,
		flag_key: &str,
	) -> Result<Option<FlagRecord>> {
		let row = sqlx::query_as::<_, FlagRow>(
			r#"
			SELECT f.id, f.project_id, f.key
			FROM flags f
			JOIN environments e ON e.project_id = f.project_id
			WHERE e.id = ? AND f.key = ?
			"#,
		)
		.bind(environment_id.to_string())
		.bind(flag_key)
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};

		let flag_id = row.id.clone();

		let variations = sqlx::query_as::<_, VariationRow>(
			r#"
			SELECT id, name, value, value_type
			FROM variations
			WHERE flag_id = ?
			ORDER BY id
			"#,
		)
		.bind(&flag_id)
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(VariationRecord::from)
		.collect();

		let states = sqlx::query_as::<_, StateRow>(
			r#"
			SELECT environment_id, enabled, default_variation_id
			FROM flag_states
			WHERE flag_id = ? AND environment_id = ?
			"#,
		)
		.bind(&flag_id)
		.bind(environment_id.to_string())
		.fetch_all(&self.pool)
		.await?
		.into_iter()
		.map(TryInto::try_into)
		.collect::<Result<Vec<FlagStateRecord>>>()?;

		let rules = self.load_rules(&flag_id, environment_id).await?;

		Ok(Some(FlagRecord {
			id: parse_id(&row.id, "flag ID")?,
			project_id: parse_id(&row.project_id, "project ID")?,
			key: row.key,
			variations,
			states,
			rules,
		}))
	}

	#[instrument(skip(self), fields(environment_id = %environment_id))]
	async fn list_flag_keys(&self, environment_id: EnvironmentId) -> Result<Vec<String>> {
		let keys = sqlx::query_scalar::<_, String>(
			r#"
			SELECT f.key
			FROM flags f
			JOIN flag_states s ON s.flag_id = f.id
			WHERE s.environment_id = ?
			ORDER BY f.key
			"#,
		)
		.bind(environment_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		Ok(keys)
	}

	#[instrument(skip(self, api_key))]
	async fn resolve_api_key(&self, api_key: &str) -> Result<Option<EnvironmentIdentity>> {
		let row = sqlx::query_as::<_, IdentityRow>(
			r#"
			SELECT e.id AS environment_id, e.project_id
			FROM api_keys k
			JOIN environments e ON e.id = k.environment_id
			WHERE k.key = ?
			"#,
		)
		.bind(api_key)
		.fetch_optional(&self.pool)
		.await?;

		row.map(TryInto::try_into).transpose()
	}

	#[instrument(skip(self), fields(environment_id = %environment_id))]
	async fn project_of_environment(
		&self,
		environment_id: EnvironmentId,
	) -> Result<Option<ProjectId>> {
		let project = sqlx::query_scalar::<_, String>("SELECT project_id FROM environments WHERE id = ?")
			.bind(environment_id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		project.map(|p| parse_id(&p, "project ID")).transpose()
	}

	#[instrument(skip(self), fields(project_id = %project_id))]
	async fn list_environments(&self, project_id: ProjectId) -> Result<Vec<EnvironmentId>> {
		let ids = sqlx::query_scalar::<_, String>(
			"SELECT id FROM environments WHERE project_id = ? ORDER BY created_at, id",
		)
		.bind(project_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		ids.iter().map(|id| parse_id(id, "environment ID")).collect()
	}
}

impl SqliteFlagSource {
	async fn load_rules(&self, flag_id: &str, environment_id: EnvironmentId) -> Result<Vec<RuleRecord>> {
		let env = environment_id.to_string();

		let rule_rows = sqlx::query_as::<_, RuleRow>(
			r#"
			SELECT id, environment_id, rule_order, kind, rollout_percentage, target_variation_id
			FROM rules
			WHERE flag_id = ? AND environment_id = ?
			ORDER BY rule_order, id
			"#,
		)
		.bind(flag_id)
		.bind(&env)
		.fetch_all(&self.pool)
		.await?;

		if rule_rows.is_empty() {
			return Ok(Vec::new());
		}

		let mut conditions: HashMap<String, Vec<ConditionRecord>> = HashMap::new();
		for row in sqlx::query_as::<_, ConditionRow>(
			r#"
			SELECT c.rule_id, c.attribute, c.operator, c.value
			FROM rule_conditions c
			JOIN rules r ON r.id = c.rule_id
			WHERE r.flag_id = ? AND r.environment_id = ?
			ORDER BY c.rule_id, c.position
			"#,
		)
		.bind(flag_id)
		.bind(&env)
		.fetch_all(&self.pool)
		.await?
		{
			conditions.entry(row.rule_id).or_default().push(ConditionRecord {
				attribute: row.attribute,
				operator: row.operator,
				value: row.value,
			});
		}

		let mut distribution: HashMap<String, Vec<SplitRecord>> = HashMap::new();
		for row in sqlx::query_as::<_, SplitRow>(
			r#"
			SELECT d.rule_id, d.variation_id, d.weight
			FROM rule_distribution d
			JOIN rules r ON r.id = d.rule_id
			WHERE r.flag_id = ? AND r.environment_id = ?
			ORDER BY d.rule_id, d.position
			"#,
		)
		.bind(flag_id)
		.bind(&env)
		.fetch_all(&self.pool)
		.await?
		{
			distribution.entry(row.rule_id).or_default().push(SplitRecord {
				variation_id: row.variation_id,
				weight: clamp_u32(row.weight),
			});
		}

		rule_rows
			.into_iter()
			.map(|row| -> Result<RuleRecord> {
				let conditions = conditions.remove(&row.id).unwrap_or_default();
				let distribution = distribution.remove(&row.id).unwrap_or_default();
				Ok(RuleRecord {
					environment_id: parse_id(&row.environment_id, "environment ID")?,
					order: clamp_u32(row.rule_order),
					kind: row.kind,
					conditions,
					rollout_percentage: row.rollout_percentage.map(|p| clamp_u32(p).min(100)),
					target_variation_id: row.target_variation_id,
					distribution,
					id: row.id,
				})
			})
			.collect()
	}
}

// Authoring writes. The admin surface calls these, then notifies the change
// pipeline. They never touch the cache.
impl SqliteFlagSource {
	#[instrument(skip(self))]
	pub async fn create_project(&self, name: &str) -> Result<ProjectId> {
		let id = ProjectId::new();
		sqlx::query("INSERT INTO projects (id, name, created_at) VALUES (?, ?, ?)")
			.bind(id.to_string())
			.bind(name)
			.bind(Utc::now().to_rfc3339())
			.execute(&self.pool)
			.await?;
		Ok(id)
	}

	#[instrument(skip(self), fields(project_id = %project_id))]
	pub async fn create_environment(&self, project_id: ProjectId, name: &str) -> Result<EnvironmentId> {
		let id = EnvironmentId::new();
		sqlx::query(
			"INSERT INTO environments (id, project_id, name, created_at) VALUES (?, ?, ?, ?)",
		)
		.bind(id.to_string())
		.bind(project_id.to_string())
		.bind(name)
		.bind(Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(id)
	}

	#[instrument(skip(self, api_key), fields(environment_id = %environment_id))]
	pub async fn create_api_key(&self, environment_id: EnvironmentId, api_key: &str) -> Result<()> {
		sqlx::query("INSERT INTO api_keys (key, environment_id, created_at) VALUES (?, ?, ?)")
			.bind(api_key)
			.bind(environment_id.to_string())
			.bind(Utc::now().to_rfc3339())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[instrument(skip(self, api_key))]
	pub async fn revoke_api_key(&self, api_key: &str) -> Result<bool> {
		let result = sqlx::query("DELETE FROM api_keys WHERE key = ?")
			.bind(api_key)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	/// Creates a flag with its variations.
	#[instrument(skip(self, variations), fields(project_id = %project_id, flag_key = %key))]
	pub async fn create_flag(
		&self,
		project_id: ProjectId,
		key: &str,
		variations: &[VariationRecord],
	) -> Result<FlagId> {
		let id = FlagId::new();
		let mut tx = self.pool.begin().await?;

		sqlx::query("INSERT INTO flags (id, project_id, key, created_at) VALUES (?, ?, ?, ?)")
			.bind(id.to_string())
			.bind(project_id.to_string())
			.bind(key)
			.bind(Utc::now().to_rfc3339())
			.execute(&mut *tx)
			.await?;

		for variation in variations {
			sqlx::query(
				"INSERT INTO variations (id, flag_id, name, value, value_type) VALUES (?, ?, ?, ?, ?)",
			)
			.bind(&variation.id)
			.bind(id.to_string())
			.bind(&variation.name)
			.bind(&variation.value)
			.bind(&variation.value_type)
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;
		Ok(id)
	}

	#[instrument(skip(self), fields(flag_id = %flag_id))]
	pub async fn update_variation_value(
		&self,
		flag_id: FlagId,
		variation_id: &str,
		value: &str,
	) -> Result<bool> {
		let result = sqlx::query("UPDATE variations SET value = ? WHERE flag_id = ? AND id = ?")
			.bind(value)
			.bind(flag_id.to_string())
			.bind(variation_id)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	/// Inserts or replaces the flag's state in an environment.
	#[instrument(skip(self), fields(flag_id = %flag_id, environment_id = %environment_id))]
	pub async fn set_flag_state(
		&self,
		flag_id: FlagId,
		environment_id: EnvironmentId,
		enabled: bool,
		default_variation_id: &str,
	) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO flag_states (flag_id, environment_id, enabled, default_variation_id, updated_at)
			VALUES (?, ?, ?, ?, ?)
			ON CONFLICT(flag_id, environment_id) DO UPDATE SET
				enabled = excluded.enabled,
				default_variation_id = excluded.default_variation_id,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(flag_id.to_string())
		.bind(environment_id.to_string())
		.bind(enabled)
		.bind(default_variation_id)
		.bind(Utc::now().to_rfc3339())
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	/// Removes the flag's state in an environment, leaving it unconfigured there.
	#[instrument(skip(self), fields(flag_id = %flag_id, environment_id = %environment_id))]
	pub async fn clear_flag_state(&self, flag_id: FlagId, environment_id: EnvironmentId) -> Result<bool> {
		let result = sqlx::query("DELETE FROM flag_states WHERE flag_id = ? AND environment_id = ?")
			.bind(flag_id.to_string())
			.bind(environment_id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected() > 0)
	}

	/// Appends a rule after the existing rules of its (flag, environment).
	///
	/// The stored order is the current rule count; `rule.order` is ignored.
	#[instrument(skip(self, rule), fields(flag_id = %flag_id, rule_id = %rule.id))]
	pub async fn add_rule(&self, flag_id: FlagId, rule: &RuleRecord) -> Result<u32> {
		let mut tx = self.pool.begin().await?;

		let count: i64 = sqlx::query_scalar(
			"SELECT COUNT(*) FROM rules WHERE flag_id = ? AND environment_id = ?",
		)
		.bind(flag_id.to_string())
		.bind(rule.environment_id.to_string())
		.fetch_one(&mut *tx)
		.await?;

		sqlx::query(
			r#"
			INSERT INTO rules (id, flag_id, environment_id, rule_order, kind, rollout_percentage, target_variation_id)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&rule.id)
		.bind(flag_id.to_string())
		.bind(rule.environment_id.to_string())
		.bind(count)
		.bind(&rule.kind)
		.bind(rule.rollout_percentage.map(i64::from))
		.bind(&rule.target_variation_id)
		.execute(&mut *tx)
		.await?;

		for (position, condition) in rule.conditions.iter().enumerate() {
			sqlx::query(
				"INSERT INTO rule_conditions (rule_id, position, attribute, operator, value) VALUES (?, ?, ?, ?, ?)",
			)
			.bind(&rule.id)
			.bind(position as i64)
			.bind(&condition.attribute)
			.bind(&condition.operator)
			.bind(&condition.value)
			.execute(&mut *tx)
			.await?;
		}

		for (position, split) in rule.distribution.iter().enumerate() {
			sqlx::query(
				"INSERT INTO rule_distribution (rule_id, position, variation_id, weight) VALUES (?, ?, ?, ?)",
			)
			.bind(&rule.id)
			.bind(position as i64)
			.bind(&split.variation_id)
			.bind(i64::from(split.weight))
			.execute(&mut *tx)
			.await?;
		}

		tx.commit().await?;
		Ok(clamp_u32(count))
	}

	/// Moves the listed rules to the front in the given sequence. Unlisted rules
	/// keep their relative order after them. Orders end up dense `0..N-1`.
	#[instrument(skip(self, ordered_rule_ids), fields(flag_id = %flag_id, environment_id = %environment_id))]
	pub async fn reorder_rules(
		&self,
		flag_id: FlagId,
		environment_id: EnvironmentId,
		ordered_rule_ids: &[String],
	) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		let current: Vec<String> = sqlx::query_scalar(
			"SELECT id FROM rules WHERE flag_id = ? AND environment_id = ? ORDER BY rule_order, id",
		)
		.bind(flag_id.to_string())
		.bind(environment_id.to_string())
		.fetch_all(&mut *tx)
		.await?;

		for id in ordered_rule_ids {
			if !current.contains(id) {
				return Err(FlagsServerError::NotFound(format!("rule {id}")));
			}
		}

		let mut sequence: Vec<&String> = ordered_rule_ids.iter().collect();
		sequence.extend(current.iter().filter(|id| !ordered_rule_ids.contains(*id)));

		for (index, id) in sequence.into_iter().enumerate() {
			sqlx::query("UPDATE rules SET rule_order = ? WHERE id = ?")
				.bind(index as i64)
				.bind(id)
				.execute(&mut *tx)
				.await?;
		}

		tx.commit().await?;
		Ok(())
	}

	/// Deletes a rule and closes the gap it leaves in its (flag, environment) orders.
	#[instrument(skip(self))]
	pub async fn delete_rule(&self, rule_id: &str) -> Result<bool> {
		let mut tx = self.pool.begin().await?;

		let owner = sqlx::query_as::<_, RuleOwnerRow>(
			"SELECT flag_id, environment_id FROM rules WHERE id = ?",
		)
		.bind(rule_id)
		.fetch_optional(&mut *tx)
		.await?;

		let Some(owner) = owner else {
			return Ok(false);
		};

		sqlx::query("DELETE FROM rule_conditions WHERE rule_id = ?")
			.bind(rule_id)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM rule_distribution WHERE rule_id = ?")
			.bind(rule_id)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM rules WHERE id = ?")
			.bind(rule_id)
			.execute(&mut *tx)
			.await?;

		let remaining: Vec<String> = sqlx::query_scalar(
			"SELECT id FROM rules WHERE flag_id = ? AND environment_id = ? ORDER BY rule_order, id",
		)
		.bind(&owner.flag_id)
		.bind(&owner.environment_id)
		.fetch_all(&mut *tx)
		.await?;

		for (index, id) in remaining.iter().enumerate() {
			sqlx::query("UPDATE rules SET rule_order = ? WHERE id = ?")
				.bind(index as i64)
				.bind(id)
				.execute(&mut *tx)
				.await?;
		}

		tx.commit().await?;
		Ok(true)
	}

	/// Returns `(rule_id, order)` pairs for a (flag, environment) in stored order.
	pub async fn rule_orders(
		&self,
		flag_id: FlagId,
		environment_id: EnvironmentId,
	) -> Result<Vec<(String, u32)>> {
		let rows = sqlx::query_as::<_, (String, i64)>(
			"SELECT id, rule_order FROM rules WHERE flag_id = ? AND environment_id = ? ORDER BY rule_order, id",
		)
		.bind(flag_id.to_string())
		.bind(environment_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		Ok(rows.into_iter().map(|(id, order)| (id, clamp_u32(order))).collect())
	}
}

fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T> {
	raw.parse()
		.map_err(|_| FlagsServerError::Internal(format!("Invalid {what} in database")))
}

fn clamp_u32(value: i64) -> u32 {
	u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[derive(sqlx::FromRow)]
struct FlagRow {
	id: String,
	project_id: String,
	key: String,
}

#[derive(sqlx::FromRow)]
struct VariationRow {
	id: String,
	name: String,
	value: String,
	value_type: String,
}

impl From<VariationRow> for VariationRecord {
	fn from(row: VariationRow) -> Self {
		VariationRecord {
			id: row.id,
			name: row.name,
			value: row.value,
			value_type: row.value_type,
		}
	}
}

#[derive(sqlx::FromRow)]
struct StateRow {
	environment_id: String,
	enabled: bool,
	default_variation_id: String,
}

impl TryFrom<StateRow> for FlagStateRecord {
	type Error = FlagsServerError;

	fn try_from(row: StateRow) -> Result<Self> {
		Ok(FlagStateRecord {
			environment_id: parse_id(&row.environment_id, "environment ID")?,
			enabled: row.enabled,
			default_variation_id: row.default_variation_id,
		})
	}
}

#[derive(sqlx::FromRow)]
struct RuleRow {
	id: String,
	environment_id: String,
	rule_order: i64,
	kind: String,
	rollout_percentage: Option<i64>,
	target_variation_id: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RuleOwnerRow {
	flag_id: String,
	environment_id: String,
}

#[derive(sqlx::FromRow)]
struct ConditionRow {
	rule_id: String,
	attribute: String,
	operator: String,
	value: String,
}

#[derive(sqlx::FromRow)]
struct SplitRow {
	rule_id: String,
	variation_id: String,
	weight: i64,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
	environment_id: String,
	project_id: String,
}

impl TryFrom<IdentityRow> for EnvironmentIdentity {
	type Error = FlagsServerError;

	fn try_from(row: IdentityRow) -> Result<Self> {
		Ok(EnvironmentIdentity {
			environment_id: parse_id(&row.environment_id, "environment ID")?,
			project_id: parse_id(&row.project_id, "project ID")?,
		})
	}
}
