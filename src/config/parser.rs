//! Loading of `fleetform.deploy.yaml`.
//!
//! [`ConfigParser::load`] is the single entry point: it reads the `.env`
//! next to the file, parses the YAML, applies `FLEETFORM_*` overrides and
//! checks the engine settings every client depends on.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, FleetError, Result};

use super::spec::FleetConfig;

/// File names searched for, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["fleetform.deploy.yaml", "fleet.yaml"];

/// Environment variables that replace a setting of the file.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("FLEETFORM_PROJECT_NAME", "project.name"),
    ("FLEETFORM_PROJECT_ENVIRONMENT", "project.environment"),
    ("FLEETFORM_ENGINE_ENDPOINT", "engine.endpoint"),
    ("FLEETFORM_ENGINE_REGION", "engine.region"),
    ("FLEETFORM_STAGING_LOCATION", "engine.staging_location"),
];

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Loads fleet configuration files.
pub struct ConfigParser {
    env: EnvLookup,
}

impl Default for ConfigParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigParser").finish_non_exhaustive()
    }
}

impl ConfigParser {
    /// Creates a parser reading overrides from the process environment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_env(|name| std::env::var(name).ok())
    }

    /// Creates a parser reading overrides through `lookup`.
    #[must_use]
    pub fn with_env(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            env: Box::new(lookup),
        }
    }

    /// Loads a configuration file and the `.env` beside it.
    ///
    /// Variables already set in the process win over the `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, the YAML or
    /// `.env` is invalid, or the engine settings are malformed.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<FleetConfig> {
        let path = path.as_ref();
        load_dotenv(path.parent().unwrap_or_else(|| Path::new(".")))?;

        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::ParseError {
                    message: format!("Failed to read file: {e}"),
                    location: Some(path.display().to_string()),
                }
            }
        })?;

        self.parse(&content, Some(path))
    }

    /// Parses a configuration document and applies overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or the engine settings are
    /// malformed.
    pub fn parse(&self, content: &str, source: Option<&Path>) -> Result<FleetConfig> {
        let mut config: FleetConfig = serde_yaml::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            }
        })?;

        for (var, field) in ENV_OVERRIDES {
            if let Some(value) = (self.env)(var) {
                debug!("Overriding {field} from {var}");
                set_field(&mut config, field, value);
            }
        }

        check_engine(&config)?;

        debug!(
            "Loaded {} with {} units",
            config.qualified_name(),
            config.units.len()
        );
        Ok(config)
    }

    /// Reads the engine token from the variable the configuration names.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is not set.
    pub fn engine_token(config: &FleetConfig) -> Result<String> {
        std::env::var(&config.engine.token_env).map_err(|_| {
            FleetError::Config(ConfigError::MissingEnvVar {
                name: config.engine.token_env.clone(),
            })
        })
    }
}

fn set_field(config: &mut FleetConfig, field: &str, value: String) {
    match field {
        "project.name" => config.project.name = value,
        "project.environment" => config.project.environment = value,
        "engine.endpoint" => config.engine.endpoint = value,
        "engine.region" => config.engine.region = Some(value),
        "engine.staging_location" => config.engine.staging_location = Some(value),
        _ => {}
    }
}

/// Checks settings that must hold before any client is built.
fn check_engine(config: &FleetConfig) -> Result<()> {
    let token_env = &config.engine.token_env;
    let valid_var = token_env
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase() || c == '_')
        && token_env
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !valid_var {
        return Err(ConfigError::validation(
            format!("'{token_env}' is not an environment variable name (A-Z, 0-9, _)"),
            "engine.token_env",
        )
        .into());
    }

    if let Some(staging) = &config.engine.staging_location {
        let well_formed = staging
            .split_once("://")
            .is_some_and(|(scheme, rest)| {
                !scheme.is_empty()
                    && scheme.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                    && !rest.trim_matches('/').is_empty()
            })
            && !staging.contains(['?', '#', ' ']);
        if !well_formed {
            return Err(ConfigError::validation(
                format!("'{staging}' is not a location like s3://bucket/prefix"),
                "engine.staging_location",
            )
            .into());
        }
    }

    Ok(())
}

fn load_dotenv(dir: &Path) -> Result<()> {
    let env_path = dir.join(".env");
    if !env_path.is_file() {
        debug!("No .env at {}", env_path.display());
        return Ok(());
    }

    info!("Loading environment from: {}", env_path.display());
    dotenvy::from_path(&env_path).map_err(|e| {
        ConfigError::ParseError {
            message: format!("Failed to load .env file: {e}"),
            location: Some(env_path.display().to_string()),
        }
        .into()
    })
}

/// Finds a configuration file in `start_dir` or the nearest parent that
/// has one.
///
/// # Errors
///
/// Returns an error if no directory up to the root holds one.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let absolute = std::fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());

    absolute
        .ancestors()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
        .inspect(|found| info!("Found configuration file: {}", found.display()))
        .ok_or_else(|| {
            ConfigError::FileNotFound {
                path: start.join(CONFIG_FILE_NAMES[0]),
            }
            .into()
        })
}
