//! Wire envelope of custom resource invocations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Prefix of the physical id returned when a CREATE fails.
pub const FAILED_ID_PREFIX: &str = "custom:failed:";

/// Lifecycle event delivered to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// Resource added to a template.
    Create,
    /// Resource properties changed.
    Update,
    /// Resource removed, or its unit deleted.
    Delete,
}

/// Invocation sent by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    /// Lifecycle event.
    pub request_type: RequestKind,
    /// Custom resource type tag, e.g. `Custom::Alarms`.
    pub resource_type: String,
    /// Logical id of the resource in its template.
    pub logical_resource_id: String,
    /// Physical id returned by an earlier CREATE or UPDATE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    /// Current properties.
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
    /// Previous properties, on UPDATE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Map<String, Value>>,
}

/// Outcome reported back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// Handler succeeded.
    Success,
    /// Handler or validation failed.
    Failed,
}

/// Response returned to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// Outcome.
    pub status: ResponseStatus,
    /// Physical id of the resource.
    pub physical_resource_id: String,
    /// Outputs readable from the template.
    #[serde(default)]
    pub data: HashMap<String, String>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl InvocationResponse {
    /// Successful response.
    #[must_use]
    pub fn success(output: HandlerOutput) -> Self {
        Self {
            status: ResponseStatus::Success,
            physical_resource_id: output.physical_id,
            data: output.outputs,
            reason: None,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failed(physical_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            physical_resource_id: physical_id.into(),
            data: HashMap::new(),
            reason: Some(reason.into()),
        }
    }

    /// Failed response to a request that never reached a handler.
    ///
    /// `raw` may be malformed; the prior physical id is echoed when it can
    /// be read, otherwise a placeholder is built from the logical id.
    #[must_use]
    pub fn unserved(raw: &str, reason: impl Into<String>) -> Self {
        let value: serde_json::Value = serde_json::from_str(raw).unwrap_or_default();
        let field = |name: &str| value.get(name).and_then(serde_json::Value::as_str);

        let physical_id = field("physicalResourceId").map_or_else(
            || failed_physical_id(field("logicalResourceId").unwrap_or("unknown")),
            String::from,
        );
        Self::failed(physical_id, reason)
    }

    /// Returns true for a successful response.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// What a handler returns from CREATE and UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutput {
    /// Physical id identifying the side effect.
    pub physical_id: String,
    /// Outputs readable from the template.
    pub outputs: HashMap<String, String>,
}

impl HandlerOutput {
    /// Output with no data.
    #[must_use]
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            physical_id: physical_id.into(),
            outputs: HashMap::new(),
        }
    }
}

/// Placeholder physical id for a CREATE that failed before any side effect.
#[must_use]
pub fn failed_physical_id(logical_id: &str) -> String {
    format!("{FAILED_ID_PREFIX}{logical_id}")
}
