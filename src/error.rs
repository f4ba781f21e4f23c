//! Error types for the fleetform deployment system.
//!
//! This module provides the error hierarchy for every layer of the
//! reconciliation engine: configuration, the declarative engine API, the
//! object-store side channel, custom resource validation, planning,
//! execution, teardown and migration.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the fleetform deployment system.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Declarative engine API errors.
    #[error("Engine API error: {0}")]
    Engine(#[from] EngineError),

    /// Object-store side channel errors.
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// Custom resource property validation errors.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Change planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Change execution errors.
    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    /// Teardown errors.
    #[error("Teardown error: {0}")]
    Teardown(#[from] TeardownError),

    /// Migration errors.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Circular dependency detected between units.
    #[error("Circular dependency detected: {cycle}")]
    CircularDependency {
        /// Description of the cycle.
        cycle: String,
    },

    /// Two handlers were registered for the same custom resource type.
    #[error("Duplicate handler registration for custom resource type '{type_tag}'")]
    DuplicateHandler {
        /// The duplicated type tag.
        type_tag: String,
    },

    /// A custom resource type has no registered handler.
    #[error("No handler registered for custom resource type '{type_tag}'")]
    UnknownResourceType {
        /// The unregistered type tag.
        type_tag: String,
    },
}

/// Declarative engine API errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The credentials used against the engine have expired.
    #[error(
        "Engine credentials expired ({message}); re-authenticate and resume, \
         in-flight operations keep running"
    )]
    CredentialsExpired {
        /// Message returned by the engine.
        message: String,
    },

    /// Authentication failed for a reason other than expiry.
    #[error("Engine authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The engine rejected the request (bad request, conflict, invalid template).
    #[error("Engine rejected request: {status} - {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error message from the engine.
        message: String,
    },

    /// The addressed entity does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of entity (unit, change request, table...).
        kind: String,
        /// Name or id of the entity.
        name: String,
    },

    /// Throttled by the engine.
    #[error("Engine API throttled, retry after {retry_after_secs} seconds")]
    Throttled {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with the engine: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the engine.
    #[error("Invalid response from the engine: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Object-store side channel errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// Bucket name.
        bucket: String,
    },

    /// The credentials used against the store have expired.
    #[error("Object store credentials expired; re-authenticate and resume")]
    CredentialsExpired,

    /// Any other backend failure.
    #[error("Object store request failed: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Custom resource property decode or schema failure.
///
/// Raised before any handler runs, so no side effects happen on bad input.
#[derive(Debug, Error)]
#[error("Invalid properties for {type_tag}: {message}")]
pub struct ValidationError {
    /// Custom resource type tag.
    pub type_tag: String,
    /// Offending field, when known.
    pub field: Option<String>,
    /// Description of the failure.
    pub message: String,
}

/// Change planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The change request failed for a reason other than "no changes".
    #[error("Change request {change} for unit '{unit}' failed: {reason}")]
    ChangeFailed {
        /// Unit name.
        unit: String,
        /// Change request name.
        change: String,
        /// Status reason from the engine.
        reason: String,
    },

    /// The unit is in a failed state no change can be applied to.
    #[error("Unit '{unit}' is in {status} and cannot be changed; repair or delete it first")]
    NotUpdatable {
        /// Unit name.
        unit: String,
        /// Current status.
        status: String,
    },

    /// The unit stayed busy across every planning attempt.
    #[error("Unit '{unit}' is still busy after {attempts} planning attempts")]
    StillBusy {
        /// Unit name.
        unit: String,
        /// Attempts made.
        attempts: u32,
    },
}

/// Change execution errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The unit reached a failure terminal status.
    #[error("Unit '{unit}' ended in {status}: {reason} ({} failed resources)", .diagnostics.len())]
    UnitFailed {
        /// Unit name.
        unit: String,
        /// Terminal status.
        status: String,
        /// Unit status reason.
        reason: String,
        /// Every nested resource not in a success status.
        diagnostics: Vec<ResourceDiagnostic>,
    },

    /// A poll loop exceeded its wall-clock timeout.
    #[error(
        "Timed out after {elapsed:?} waiting for {what}; the operation keeps \
         running in the engine, re-attach by polling again"
    )]
    Timeout {
        /// What was being waited for.
        what: String,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// Some units failed or were skipped; the rest of the fleet converged.
    #[error("{failed} of {total} units did not deploy")]
    Incomplete {
        /// Units failed or skipped.
        failed: usize,
        /// Units in the fleet.
        total: usize,
    },

    /// Dependencies of the unit failed, so it was not attempted.
    #[error("Unit '{unit}' skipped because dependency '{dependency}' failed")]
    DependencyFailed {
        /// Unit name.
        unit: String,
        /// Failed dependency.
        dependency: String,
    },
}

/// Teardown errors.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// Some units failed to delete; unrelated cleanup still completed.
    #[error("{failed} of {total} teardown steps failed")]
    Partial {
        /// Number of failures.
        failed: usize,
        /// Number of attempted units.
        total: usize,
    },
}

/// Migration errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Deleting the unit that owns an obsolete resource failed.
    #[error("Failed to remove unit '{unit}' holding obsolete {resource_type} '{logical_id}': {reason}")]
    RemovalFailed {
        /// Unit name.
        unit: String,
        /// Obsolete logical id.
        logical_id: String,
        /// Obsolete type tag.
        resource_type: String,
        /// Failure reason.
        reason: String,
    },
}

/// One nested resource that is not in a success status.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ResourceDiagnostic {
    /// Unit that owns the resource.
    pub unit: String,
    /// Logical id.
    pub logical_id: String,
    /// Physical id, if one was assigned.
    pub physical_id: Option<String>,
    /// Resource type tag.
    pub type_tag: String,
    /// Resource status.
    pub status: String,
    /// Diagnostic reason reported by the engine.
    pub reason: String,
}

impl std::fmt::Display for ResourceDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({}) {}: {}",
            self.unit, self.logical_id, self.type_tag, self.status, self.reason
        )
    }
}

/// Result type alias for fleetform operations.
pub type Result<T> = std::result::Result<T, FleetError>;

impl FleetError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Engine(EngineError::Throttled { .. } | EngineError::NetworkError { .. })
        )
    }

    /// Returns the delay the engine asked for before a retry, if any.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Engine(EngineError::Throttled { retry_after_secs }) => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Returns true if the operator must re-authenticate and resume.
    #[must_use]
    pub const fn is_credential_expiry(&self) -> bool {
        matches!(
            self,
            Self::Engine(EngineError::CredentialsExpired { .. })
                | Self::Store(StoreError::CredentialsExpired)
        )
    }

    /// Returns true if the error says the addressed entity does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Engine(EngineError::NotFound { .. })
                | Self::Store(StoreError::BucketNotFound { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl EngineError {
    /// Creates a rejected-request error.
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl StoreError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl ValidationError {
    /// Creates a validation error for a custom resource type.
    #[must_use]
    pub fn new(type_tag: impl Into<String>, field: Option<String>, message: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            field,
            message: message.into(),
        }
    }
}
