//! The declarative engine seam.
//!
//! Every orchestrator talks to the engine through this trait so that the
//! HTTP client can be swapped for an in-memory fake in tests.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{ChangeRequest, NewChangeRequest, ResourceRecord, UnitDescription};

/// Operations the reconciliation engine needs from the declarative engine.
#[async_trait]
pub trait DeclarativeEngine: Send + Sync {
    /// Describes a unit. Returns `None` if the unit does not exist.
    async fn describe_unit(&self, unit: &str) -> Result<Option<UnitDescription>>;

    /// Lists change requests currently attached to a unit.
    async fn list_change_requests(&self, unit: &str) -> Result<Vec<ChangeRequest>>;

    /// Submits a change request and returns its id.
    async fn create_change_request(&self, request: &NewChangeRequest) -> Result<String>;

    /// Describes a change request.
    async fn describe_change_request(&self, unit: &str, change_id: &str) -> Result<ChangeRequest>;

    /// Applies a ready change request.
    async fn execute_change_request(&self, unit: &str, change_id: &str) -> Result<()>;

    /// Discards a change request.
    async fn delete_change_request(&self, unit: &str, change_id: &str) -> Result<()>;

    /// Lists the resource records directly owned by a unit.
    ///
    /// Fails with a not-found error if the unit does not exist.
    async fn list_unit_resources(&self, unit: &str) -> Result<Vec<ResourceRecord>>;

    /// Starts deletion of a unit.
    async fn delete_unit(&self, unit: &str) -> Result<()>;
}
