//! Side-channel services used by custom resource handlers, teardown and
//! migration, for effects the declarative engine cannot express.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Container image registry operations.
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Deletes a repository and every image in it in one call.
    ///
    /// A repository that no longer exists is not an error.
    async fn force_delete_repository(&self, name: &str) -> Result<()>;
}

/// Comparison operator of a metric alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparison {
    /// Metric strictly above threshold.
    GreaterThan,
    /// Metric at or above threshold.
    GreaterThanOrEqual,
    /// Metric strictly below threshold.
    LessThan,
    /// Metric at or below threshold.
    LessThanOrEqual,
}

/// A metric alarm definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDefinition {
    /// Fully qualified alarm name.
    pub name: String,
    /// Metric the alarm watches.
    pub metric: String,
    /// Threshold value.
    pub threshold: f64,
    /// Comparison operator.
    pub comparison: Comparison,
    /// Evaluation period in seconds.
    pub period_secs: u32,
    /// Number of periods that must breach.
    pub evaluation_periods: u32,
}

/// Metric alarm operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlarmService: Send + Sync {
    /// Creates or replaces an alarm (idempotent).
    async fn put_alarm(&self, alarm: &AlarmDefinition) -> Result<()>;

    /// Lists alarm names starting with a prefix.
    async fn list_alarms(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes alarms by name; missing names are ignored.
    async fn delete_alarms(&self, names: &[String]) -> Result<()>;
}

/// Status of a multi-region table or one of its replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    /// Region of the replica.
    pub region: String,
    /// Replica status string.
    pub status: String,
}

/// Live description of a multi-region table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescription {
    /// Table name.
    pub name: String,
    /// Status of the parent definition.
    pub status: String,
    /// Regional replicas, excluding the home region.
    #[serde(default)]
    pub replicas: Vec<ReplicaStatus>,
}

/// Multi-region table operations.
#[async_trait]
pub trait MultiRegionTables: Send + Sync {
    /// Describes a table. Returns `None` if it does not exist.
    async fn describe_table(&self, name: &str) -> Result<Option<TableDescription>>;

    /// Starts removal of one regional replica.
    async fn remove_replica(&self, name: &str, region: &str) -> Result<()>;

    /// Starts deletion of the parent table definition.
    async fn delete_table(&self, name: &str) -> Result<()>;
}
