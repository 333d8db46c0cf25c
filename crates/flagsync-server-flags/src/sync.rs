// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Change pipeline run after an authoring write to the source of record.
//!
//! The cache is always written (or cleared) before the notification is
//! published, so a reader that reacts to the notification sees the new value.
//! If the process dies between the two steps the notification is lost; clients
//! recover by resyncing when they reconnect.

use std::sync::Arc;

use tracing::{info, instrument};

use flagsync_core::{ChangeType, EnvironmentId, ProjectId};

use crate::error::{FlagsServerError, Result};
use crate::propagator::UpdatePropagator;
use crate::store::{ConfigStore, Refreshed};

#[derive(Clone)]
pub struct ConfigSync {
	store: Arc<ConfigStore>,
	propagator: Arc<UpdatePropagator>,
}

impl ConfigSync {
	pub fn new(store: Arc<ConfigStore>, propagator: Arc<UpdatePropagator>) -> Self {
		Self { store, propagator }
	}

	/// Recomputes one flag in one environment and notifies its clients.
	#[instrument(skip(self), fields(flag_key = %flag_key, environment_id = %environment_id))]
	pub async fn on_flag_changed(
		&self,
		flag_key: &str,
		environment_id: EnvironmentId,
	) -> Result<ChangeType> {
		let project_id = self
			.store
			.source()
			.project_of_environment(environment_id)
			.await?
			.ok_or_else(|| FlagsServerError::NotFound(format!("environment {environment_id}")))?;

		self.propagate(flag_key, environment_id, project_id).await
	}

	/// Runs [`ConfigSync::on_flag_changed`] for every environment of the project.
	#[instrument(skip(self), fields(flag_key = %flag_key, project_id = %project_id))]
	pub async fn on_flag_changed_everywhere(
		&self,
		project_id: ProjectId,
		flag_key: &str,
	) -> Result<Vec<(EnvironmentId, ChangeType)>> {
		let environments = self.store.source().list_environments(project_id).await?;

		let mut changes = Vec::with_capacity(environments.len());
		for environment_id in environments {
			let change = self.propagate(flag_key, environment_id, project_id).await?;
			changes.push((environment_id, change));
		}
		Ok(changes)
	}

	async fn propagate(
		&self,
		flag_key: &str,
		environment_id: EnvironmentId,
		project_id: ProjectId,
	) -> Result<ChangeType> {
		let change_type = match self.store.refresh(flag_key, environment_id).await? {
			Refreshed::Written(_) => ChangeType::Updated,
			Refreshed::Deleted => ChangeType::Deleted,
		};

		self.propagator
			.notify_change(environment_id, project_id, flag_key, change_type)
			.await?;

		info!(
			flag_key = %flag_key,
			environment_id = %environment_id,
			change_type = %change_type,
			"Flag change propagated"
		);
		Ok(change_type)
	}
}
