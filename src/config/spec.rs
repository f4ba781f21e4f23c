//! Configuration specification types for the deployment system.
//!
//! This module defines all the structs that map to the `fleetform.deploy.yaml`
//! file. The file fully describes the desired fleet: which units exist,
//! how they depend on each other, and how long to wait on the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine::PollSettings;

/// Tag key carrying the owning project on every unit and bucket.
pub const TAG_PROJECT: &str = "fleetform:project";

/// Tag key carrying the environment.
pub const TAG_ENV: &str = "fleetform:env";

/// Tag key carrying the unit name on resources created by a unit.
pub const TAG_UNIT: &str = "fleetform:unit";

/// The root configuration structure for a fleetform deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Engine connection settings.
    pub engine: EngineConfig,
    /// Polling settings.
    #[serde(default)]
    pub polling: PollingConfig,
    /// Concurrency limits.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    /// Teardown settings.
    #[serde(default)]
    pub teardown: TeardownConfig,
    /// Deployment units, in declaration order.
    pub units: Vec<UnitConfig>,
    /// Custom resource types the deployed templates use.
    #[serde(default)]
    pub custom_resources: CustomResourcesConfig,
    /// Pre-deploy migrations.
    #[serde(default)]
    pub migrations: MigrationsConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Engine connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL of the engine control API.
    pub endpoint: String,
    /// Environment variable holding the engine token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Region of the object store side channel.
    #[serde(default)]
    pub region: Option<String>,
    /// Location templates are staged at; unit templates resolve against it.
    #[serde(default)]
    pub staging_location: Option<String>,
}

/// Polling settings shared by every wait on the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollingConfig {
    /// Seconds between probes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Hard timeout of one wait, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Planning attempts while a unit stays busy.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Concurrency limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    /// Upper bound on units reconciled at once.
    #[serde(default = "default_max_parallel_units")]
    pub max_parallel_units: usize,
}

/// Teardown settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeardownConfig {
    /// Largest version count emptied by direct batch delete.
    #[serde(default = "default_direct_delete_limit")]
    pub direct_delete_limit: usize,
    /// Days after which the teardown expiration policy removes objects.
    #[serde(default = "default_expiration_days")]
    pub expiration_days: u32,
}

/// One deployment unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitConfig {
    /// Unit name within the project.
    pub name: String,
    /// Template reference, relative to the staging location.
    pub template: String,
    /// Template parameters.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Extra tags for the unit.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Units that must be deployed before, and deleted after, this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Custom resource settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomResourcesConfig {
    /// Type tags that must have a registered handler.
    #[serde(default)]
    pub types: Vec<String>,
}

/// Pre-deploy migrations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationsConfig {
    /// Resource shapes that must no longer exist.
    #[serde(default)]
    pub obsolete: Vec<ObsoleteShape>,
    /// Multi-region tables to remove.
    #[serde(default)]
    pub retired_tables: Vec<RetiredTable>,
}

/// A type + logical id combination that should no longer exist in a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObsoleteShape {
    /// Unit name within the project.
    pub unit: String,
    /// Logical id of the obsolete resource.
    pub logical_id: String,
    /// Type tag of the obsolete resource.
    pub resource_type: String,
}

/// A multi-region table to remove.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetiredTable {
    /// Table name.
    pub name: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_parallel_units: default_max_parallel_units(),
        }
    }
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            direct_delete_limit: default_direct_delete_limit(),
            expiration_days: default_expiration_days(),
        }
    }
}

// Default value functions

const fn default_interval_secs() -> u64 {
    crate::engine::DEFAULT_POLL_INTERVAL_SECS
}

const fn default_timeout_secs() -> u64 {
    crate::engine::DEFAULT_POLL_TIMEOUT_SECS
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_max_parallel_units() -> usize {
    4
}

const fn default_direct_delete_limit() -> usize {
    10_000
}

const fn default_expiration_days() -> u32 {
    1
}

fn default_environment() -> String {
    String::from("dev")
}

fn default_token_env() -> String {
    String::from("FLEETFORM_ENGINE_TOKEN")
}

impl FleetConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns the engine-side name of a unit.
    #[must_use]
    pub fn unit_full_name(&self, unit: &str) -> String {
        format!("{}-{unit}", self.qualified_name())
    }

    /// Finds a unit by name.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Returns unit names in declaration order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    /// Returns the poll settings for engine waits.
    #[must_use]
    pub const fn poll_settings(&self) -> PollSettings {
        PollSettings::from_secs(self.polling.interval_secs, self.polling.timeout_secs)
    }

    /// Returns the ownership tags every unit carries.
    #[must_use]
    pub fn ownership_tags(&self) -> HashMap<String, String> {
        HashMap::from([
            (TAG_PROJECT.to_string(), self.project.name.clone()),
            (TAG_ENV.to_string(), self.project.environment.clone()),
        ])
    }

    /// Resolves a unit's template reference against the staging location.
    #[must_use]
    pub fn template_location(&self, unit: &UnitConfig) -> String {
        match &self.engine.staging_location {
            Some(base) if !unit.template.contains("://") => {
                format!("{}/{}", base.trim_end_matches('/'), unit.template)
            }
            _ => unit.template.clone(),
        }
    }
}
