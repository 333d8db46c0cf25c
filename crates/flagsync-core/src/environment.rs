// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(pub Uuid);

impl EnvironmentId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for EnvironmentId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for EnvironmentId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for EnvironmentId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Unique identifier for a project. Flags and environments belong to a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for ProjectId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for ProjectId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for ProjectId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Unique identifier for a flag record in the source of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagId(pub Uuid);

impl FlagId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for FlagId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for FlagId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for FlagId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// What an API key resolves to: the environment it grants access to and its project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentIdentity {
	pub environment_id: EnvironmentId,
	pub project_id: ProjectId,
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_environment_id_display_parse() {
		let id = EnvironmentId::new();
		let parsed: EnvironmentId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
	}

	#[test]
	fn test_environment_id_rejects_garbage() {
		assert!("not-a-uuid".parse::<EnvironmentId>().is_err());
		assert!("".parse::<ProjectId>().is_err());
	}

	#[test]
	fn test_identity_serializes_camel_case() {
		let identity = EnvironmentIdentity {
			environment_id: EnvironmentId::new(),
			project_id: ProjectId::new(),
		};
		let json = serde_json::to_string(&identity).unwrap();
		assert!(json.contains("\"environmentId\""));
		assert!(json.contains("\"projectId\""));
	}

	proptest! {
		#[test]
		fn ids_are_unique(_i in 0..100u32) {
			prop_assert_ne!(EnvironmentId::new(), EnvironmentId::new());
		}
	}
}
