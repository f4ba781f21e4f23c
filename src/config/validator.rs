//! Configuration validation for fleet specs.
//!
//! This module validates a parsed configuration before anything touches
//! the engine, collecting every error and warning in one pass.

use crate::error::{ConfigError, FleetError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{FleetConfig, MigrationsConfig, PollingConfig, ProjectConfig, UnitConfig};

/// Validator for fleet configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationIssue>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a fleet configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found if validation fails.
    pub fn validate(&self, config: &FleetConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_engine(config, &mut result);
        Self::validate_polling(&config.polling, &mut result);
        Self::validate_units(&config.units, &mut result);
        Self::validate_migrations(config, &config.migrations, &mut result);

        if config.concurrency.max_parallel_units == 0 {
            result.errors.push(ValidationIssue {
                field: String::from("concurrency.max_parallel_units"),
                message: String::from("At least one unit must be allowed to run"),
            });
        }

        if config.teardown.direct_delete_limit == 0 {
            result.errors.push(ValidationIssue {
                field: String::from("teardown.direct_delete_limit"),
                message: String::from("Direct delete limit must be positive"),
            });
        }

        for (i, tag) in config.custom_resources.types.iter().enumerate() {
            if !tag.starts_with("Custom::") {
                result.warnings.push(format!(
                    "custom_resources.types[{i}]: '{tag}' does not use the Custom:: namespace"
                ));
            }
        }

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(FleetError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.errors.push(ValidationIssue {
                field: String::from("project.name"),
                message: String::from("Project name cannot be empty"),
            });
        } else if !is_valid_name(&project.name) {
            result.errors.push(ValidationIssue {
                field: String::from("project.name"),
                message: format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            });
        }

        if !is_valid_name(&project.environment) {
            result.errors.push(ValidationIssue {
                field: String::from("project.environment"),
                message: format!("Environment '{}' is invalid", project.environment),
            });
        }
    }

    /// Validates engine settings.
    fn validate_engine(config: &FleetConfig, result: &mut ValidationResult) {
        let endpoint = &config.engine.endpoint;
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            result.errors.push(ValidationIssue {
                field: String::from("engine.endpoint"),
                message: format!("Engine endpoint '{endpoint}' must be an http(s) URL"),
            });
        } else if endpoint.starts_with("http://") {
            result
                .warnings
                .push(String::from("engine.endpoint: plain http sends the token unencrypted"));
        }

        if config.engine.token_env.is_empty() {
            result.errors.push(ValidationIssue {
                field: String::from("engine.token_env"),
                message: String::from("Token variable name cannot be empty"),
            });
        }
    }

    /// Validates polling settings.
    fn validate_polling(polling: &PollingConfig, result: &mut ValidationResult) {
        if polling.interval_secs == 0 {
            result.errors.push(ValidationIssue {
                field: String::from("polling.interval_secs"),
                message: String::from("Poll interval must be at least 1 second"),
            });
        }

        if polling.timeout_secs < polling.interval_secs {
            result.errors.push(ValidationIssue {
                field: String::from("polling.timeout_secs"),
                message: format!(
                    "Timeout ({}s) is shorter than the poll interval ({}s)",
                    polling.timeout_secs, polling.interval_secs
                ),
            });
        }

        if polling.max_attempts == 0 {
            result.errors.push(ValidationIssue {
                field: String::from("polling.max_attempts"),
                message: String::from("At least one planning attempt is required"),
            });
        }
    }

    /// Validates all unit configurations.
    fn validate_units(units: &[UnitConfig], result: &mut ValidationResult) {
        if units.is_empty() {
            result.warnings.push(String::from("No units defined in configuration"));
            return;
        }

        let names: HashSet<&str> = units.iter().map(|u| u.name.as_str()).collect();
        let mut seen_names = HashSet::new();

        for (i, unit) in units.iter().enumerate() {
            let prefix = format!("units[{i}]");

            if !seen_names.insert(unit.name.as_str()) {
                result.errors.push(ValidationIssue {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate unit name: {}", unit.name),
                });
            }

            if !is_valid_name(&unit.name) {
                result.errors.push(ValidationIssue {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Unit name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        unit.name
                    ),
                });
            }

            if unit.template.is_empty() {
                result.errors.push(ValidationIssue {
                    field: format!("{prefix}.template"),
                    message: format!("Unit '{}' has no template", unit.name),
                });
            }

            for (j, dependency) in unit.depends_on.iter().enumerate() {
                if dependency == &unit.name {
                    result.errors.push(ValidationIssue {
                        field: format!("{prefix}.depends_on[{j}]"),
                        message: format!("Unit '{}' depends on itself", unit.name),
                    });
                } else if !names.contains(dependency.as_str()) {
                    result.errors.push(ValidationIssue {
                        field: format!("{prefix}.depends_on[{j}]"),
                        message: format!(
                            "Unit '{}' depends on unknown unit '{dependency}'",
                            unit.name
                        ),
                    });
                }
            }
        }

        if result.errors.is_empty()
            && let Err(FleetError::Config(ConfigError::CircularDependency { cycle })) =
                crate::planner::deploy_waves(units)
        {
            result.errors.push(ValidationIssue {
                field: String::from("units"),
                message: format!("Circular dependency: {cycle}"),
            });
        }
    }

    /// Validates migrations against the configured units.
    fn validate_migrations(
        config: &FleetConfig,
        migrations: &MigrationsConfig,
        result: &mut ValidationResult,
    ) {
        for (i, shape) in migrations.obsolete.iter().enumerate() {
            if config.unit(&shape.unit).is_none() {
                result.errors.push(ValidationIssue {
                    field: format!("migrations.obsolete[{i}].unit"),
                    message: format!("Migration targets unknown unit '{}'", shape.unit),
                });
            }
            if shape.logical_id.is_empty() || shape.resource_type.is_empty() {
                result.errors.push(ValidationIssue {
                    field: format!("migrations.obsolete[{i}]"),
                    message: String::from("Obsolete shape needs a logical id and a resource type"),
                });
            }
        }

        for (i, table) in migrations.retired_tables.iter().enumerate() {
            if table.name.is_empty() {
                result.errors.push(ValidationIssue {
                    field: format!("migrations.retired_tables[{i}].name"),
                    message: String::from("Retired table name cannot be empty"),
                });
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
