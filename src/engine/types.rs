//! Types exchanged with the declarative engine.
//!
//! Status strings are parsed into enums so that the planner, executor and
//! teardown engine can reason about them without string matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type tag the engine uses for a nested deployment unit.
pub const NESTED_UNIT_TYPE: &str = "AWS::CloudFormation::Stack";

/// Type tag of an object store bucket.
pub const BUCKET_TYPE: &str = "AWS::S3::Bucket";

/// Type tag of a container image repository.
pub const REPOSITORY_TYPE: &str = "AWS::ECR::Repository";

/// Status of a deployment unit as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    /// Unit created but waiting for its first change to execute.
    ReviewInProgress,
    /// Create running.
    CreateInProgress,
    /// Create finished.
    CreateComplete,
    /// Create failed.
    CreateFailed,
    /// Rollback of a failed create running.
    RollbackInProgress,
    /// Failed create rolled back; the unit can only be deleted.
    RollbackComplete,
    /// Rollback of a failed create failed.
    RollbackFailed,
    /// Update running.
    UpdateInProgress,
    /// Update finished, old resources being cleaned up.
    UpdateCompleteCleanupInProgress,
    /// Update finished.
    UpdateComplete,
    /// Update failed.
    UpdateFailed,
    /// Rollback of a failed update running.
    UpdateRollbackInProgress,
    /// Rollback of a failed update finishing cleanup.
    UpdateRollbackCompleteCleanupInProgress,
    /// Failed update rolled back.
    UpdateRollbackComplete,
    /// Rollback of a failed update failed.
    UpdateRollbackFailed,
    /// Delete running.
    DeleteInProgress,
    /// Delete finished.
    DeleteComplete,
    /// Delete failed.
    DeleteFailed,
    /// Any status this crate does not know.
    Unknown(String),
}

impl UnitStatus {
    /// Parses an engine status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "REVIEW_IN_PROGRESS" => Self::ReviewInProgress,
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "CREATE_FAILED" => Self::CreateFailed,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "ROLLBACK_FAILED" => Self::RollbackFailed,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => Self::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => Self::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Self::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => Self::UpdateRollbackComplete,
            "UPDATE_ROLLBACK_FAILED" => Self::UpdateRollbackFailed,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "DELETE_FAILED" => Self::DeleteFailed,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the engine's string for this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ReviewInProgress => "REVIEW_IN_PROGRESS",
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::CreateFailed => "CREATE_FAILED",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::Unknown(s) => s,
        }
    }

    /// Returns true while the engine is still working on the unit.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }

    /// Returns true for the statuses a successful apply ends in.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::CreateComplete | Self::UpdateComplete)
    }

    /// Returns true if the unit can accept a new UPDATE change.
    #[must_use]
    pub const fn is_updatable(&self) -> bool {
        matches!(
            self,
            Self::CreateComplete | Self::UpdateComplete | Self::UpdateRollbackComplete
        )
    }

    /// Returns true if the unit is gone.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        matches!(self, Self::DeleteComplete)
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for UnitStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UnitStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Status of a single resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus(String);

impl ResourceStatus {
    /// Wraps an engine status string.
    #[must_use]
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// Returns the raw status string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for `*_COMPLETE` statuses other than rollback ones.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0.ends_with("_COMPLETE") && !self.0.contains("ROLLBACK")
    }

    /// Returns true while the engine is still working on the resource.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.0.ends_with("_IN_PROGRESS")
    }

    /// Returns true if deletion of the resource failed.
    #[must_use]
    pub fn is_delete_failed(&self) -> bool {
        self.0 == "DELETE_FAILED"
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ResourceStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResourceStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

/// Live description of a deployment unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitDescription {
    /// Unit name.
    pub name: String,
    /// Current status.
    pub status: UnitStatus,
    /// Reason attached to the current status.
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Outputs exported by the unit.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    /// Parameters the unit was last applied with.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Tags on the unit.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// When the unit was created.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Kind of change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// The unit does not exist yet.
    Create,
    /// The unit exists and is idle.
    Update,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => f.write_str("CREATE"),
            Self::Update => f.write_str("UPDATE"),
        }
    }
}

/// Raw change request status as the engine reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RawChangeStatus {
    /// Submitted, not yet evaluated.
    CreatePending,
    /// Being evaluated.
    CreateInProgress,
    /// Evaluated; ready to apply.
    CreateComplete,
    /// Evaluation failed (including the "no changes" case).
    Failed,
    /// Being discarded.
    DeletePending,
    /// Discarded.
    DeleteComplete,
}

/// Change request as returned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    /// Engine-assigned id.
    pub id: String,
    /// Name chosen at submission.
    pub name: String,
    /// Owning unit.
    pub unit: String,
    /// CREATE or UPDATE.
    pub kind: ChangeKind,
    /// Parameters of the proposal.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Evaluation status.
    pub status: RawChangeStatus,
    /// Reason attached to the status.
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Description given at submission.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the change was already applied or is being applied.
    #[serde(default)]
    pub executing: bool,
}

/// A new change request to submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChangeRequest {
    /// Owning unit.
    pub unit: String,
    /// Unique change name.
    pub name: String,
    /// CREATE or UPDATE.
    pub kind: ChangeKind,
    /// Template reference (staged template location).
    pub template: String,
    /// Parameter map.
    pub parameters: HashMap<String, String>,
    /// Tags applied to the unit.
    pub tags: HashMap<String, String>,
    /// Free-form description.
    pub description: String,
}

/// One managed item in a unit's live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Logical id, unique within the unit.
    pub logical_id: String,
    /// Physical id, absent until the engine assigns one.
    #[serde(default)]
    pub physical_id: Option<String>,
    /// Type tag.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Current status.
    pub status: ResourceStatus,
    /// Reason attached to the status.
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Unit owning the record.
    pub unit: String,
}

impl ResourceRecord {
    /// Returns true if this record is itself a nested deployment unit.
    #[must_use]
    pub fn is_nested_unit(&self) -> bool {
        self.type_tag == NESTED_UNIT_TYPE
    }
}
