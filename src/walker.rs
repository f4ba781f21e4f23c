//! Recursive walker over a unit's resource tree.
//!
//! Visits every resource of a unit and of its nested units, depth first,
//! but only for units carrying this project's ownership tag. Units that are
//! already gone yield nothing, so teardown and diagnosis can be re-run after
//! a partial failure.

use tracing::{debug, warn};

use crate::config::TAG_PROJECT;
use crate::engine::{DeclarativeEngine, ResourceRecord};
use crate::error::{ResourceDiagnostic, Result};

/// Resource tree walker.
pub struct ResourceWalker<'a> {
    /// Engine to read units from.
    engine: &'a dyn DeclarativeEngine,
    /// Project whose units may be traversed.
    project: &'a str,
}

impl<'a> ResourceWalker<'a> {
    /// Creates a walker restricted to units owned by `project`.
    #[must_use]
    pub const fn new(engine: &'a dyn DeclarativeEngine, project: &'a str) -> Self {
        Self { engine, project }
    }

    /// Returns every resource under `unit`, nested units included.
    ///
    /// A nested unit's own record comes right before its children.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    pub async fn walk(&self, unit: &str) -> Result<Vec<ResourceRecord>> {
        let mut visited = Vec::new();

        if !self.is_owned(unit).await? {
            return Ok(visited);
        }

        let mut stack: Vec<ResourceRecord> = self.list(unit).await?;
        stack.reverse();

        while let Some(record) = stack.pop() {
            let child = record
                .is_nested_unit()
                .then(|| record.physical_id.clone())
                .flatten();
            visited.push(record);

            if let Some(child) = child
                && self.is_owned(&child).await?
            {
                let mut children = self.list(&child).await?;
                children.reverse();
                stack.extend(children);
            }
        }

        debug!("Walked {} resources under {unit}", visited.len());
        Ok(visited)
    }

    /// Returns a diagnostic for every resource not in a success status.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    pub async fn failed_resources(&self, unit: &str) -> Result<Vec<ResourceDiagnostic>> {
        Ok(self
            .walk(unit)
            .await?
            .iter()
            .filter(|r| !r.status.is_success())
            .map(diagnostic)
            .collect())
    }

    /// Returns a diagnostic for every resource whose deletion failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried.
    pub async fn delete_failures(&self, unit: &str) -> Result<Vec<ResourceDiagnostic>> {
        Ok(self
            .walk(unit)
            .await?
            .iter()
            .filter(|r| r.status.is_delete_failed())
            .map(diagnostic)
            .collect())
    }

    /// Checks that a unit exists and carries this project's tag.
    async fn is_owned(&self, unit: &str) -> Result<bool> {
        let Some(description) = self.engine.describe_unit(unit).await? else {
            debug!("Unit {unit} does not exist, nothing to walk");
            return Ok(false);
        };

        if description.status.is_deleted() {
            return Ok(false);
        }

        match description.tags.get(TAG_PROJECT) {
            Some(owner) if owner == self.project => Ok(true),
            owner => {
                warn!(
                    "Skipping unit {unit}: owned by {}, not {}",
                    owner.map_or("nobody", String::as_str),
                    self.project
                );
                Ok(false)
            }
        }
    }

    /// Lists a unit's direct resources; a unit deleted meanwhile yields none.
    async fn list(&self, unit: &str) -> Result<Vec<ResourceRecord>> {
        match self.engine.list_unit_resources(unit).await {
            Ok(records) => Ok(records),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Builds a diagnostic from a resource record.
#[must_use]
pub fn diagnostic(record: &ResourceRecord) -> ResourceDiagnostic {
    ResourceDiagnostic {
        unit: record.unit.clone(),
        logical_id: record.logical_id.clone(),
        physical_id: record.physical_id.clone(),
        type_tag: record.type_tag.clone(),
        status: record.status.to_string(),
        reason: record
            .status_reason
            .clone()
            .unwrap_or_else(|| String::from("no reason reported")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UnitStatus;
    use crate::testing::FakeEngine;

    #[tokio::test]
    async fn test_walk_is_depth_first() {
        let engine = FakeEngine::new();
        engine.add_unit("shop-dev-app", "shop", UnitStatus::UpdateFailed);
        engine.add_unit("shop-dev-app-db", "shop", UnitStatus::UpdateFailed);
        engine.add_resource("shop-dev-app", "Queue", "AWS::SQS::Queue", "UPDATE_COMPLETE", None);
        engine.add_nested("shop-dev-app", "Db", "shop-dev-app-db");
        engine.add_resource(
            "shop-dev-app-db",
            "Table",
            "AWS::DynamoDB::Table",
            "UPDATE_FAILED",
            Some("Provisioned throughput exceeded"),
        );
        engine.add_resource("shop-dev-app", "Topic", "AWS::SNS::Topic", "UPDATE_COMPLETE", None);

        let walker = ResourceWalker::new(&engine, "shop");
        let order: Vec<String> = walker
            .walk("shop-dev-app")
            .await
            .expect("walk")
            .into_iter()
            .map(|r| r.logical_id)
            .collect();

        assert_eq!(order, vec!["Queue", "Db", "Table", "Topic"]);

        let failed = walker.failed_resources("shop-dev-app").await.expect("diagnose");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].logical_id, "Table");
        assert_eq!(failed[0].unit, "shop-dev-app-db");
        assert_eq!(failed[0].reason, "Provisioned throughput exceeded");
    }

    #[tokio::test]
    async fn test_unowned_unit_is_skipped() {
        let engine = FakeEngine::new();
        engine.add_unit("other-app", "someone-else", UnitStatus::CreateComplete);
        engine.add_resource("other-app", "Bucket", "AWS::S3::Bucket", "CREATE_COMPLETE", None);

        let walker = ResourceWalker::new(&engine, "shop");
        assert!(walker.walk("other-app").await.expect("walk").is_empty());
    }

    #[tokio::test]
    async fn test_missing_unit_yields_nothing() {
        let engine = FakeEngine::new();
        let walker = ResourceWalker::new(&engine, "shop");
        assert!(walker.walk("shop-dev-gone").await.expect("walk").is_empty());
    }
}
