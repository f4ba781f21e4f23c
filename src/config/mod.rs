//! Configuration module for the fleetform deployment system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `fleetform.deploy.yaml`
//! - Validation of configuration values
//! - Computing desired-state hashes for change tracking

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{find_config_file, ConfigParser};
pub use spec::{
    ConcurrencyConfig, CustomResourcesConfig, EngineConfig, FleetConfig, MigrationsConfig,
    ObsoleteShape, PollingConfig, ProjectConfig, RetiredTable, TeardownConfig, UnitConfig,
    TAG_ENV, TAG_PROJECT, TAG_UNIT,
};
pub use validator::{ConfigValidator, ValidationIssue, ValidationResult};
