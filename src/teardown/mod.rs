//! Teardown engine.
//!
//! A run goes through five steps:
//! 1. Discover buckets and repositories in every unit's resource tree
//! 2. Pre-clean them so the engine can delete them
//! 3. Delete units, dependents before their dependencies
//! 4. Diagnose every unit that failed to delete
//! 5. Sweep buckets whose owning unit is gone, found by tag
//!
//! A failure in one unit never stops the others; every failure ends up in
//! the [`TeardownReport`].

mod preclean;
mod report;

pub use preclean::{CleanupKind, CleanupTarget, PreCleanAction, PreCleaner, TEARDOWN_RULE_ID};
pub use report::{TeardownFailure, TeardownReport, TeardownStage};

use tracing::{debug, error, info, warn};

use crate::clients::Clients;
use crate::config::{FleetConfig, TAG_ENV, TAG_PROJECT, TAG_UNIT};
use crate::error::Result;
use crate::planner::{run_bounded, teardown_waves, ChangeExecutor};
use crate::walker::ResourceWalker;

/// What happened to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitRemoval {
    Deleted,
    Absent,
}

/// Tears down every unit of a project.
pub struct TeardownEngine<'a> {
    /// Client bundle.
    clients: &'a Clients,
    /// Fleet configuration.
    config: &'a FleetConfig,
}

impl<'a> TeardownEngine<'a> {
    /// Creates a teardown engine.
    #[must_use]
    pub const fn new(clients: &'a Clients, config: &'a FleetConfig) -> Self {
        Self { clients, config }
    }

    /// Runs a full teardown.
    ///
    /// Per-unit failures are collected in the report; use
    /// [`TeardownReport::into_result`] to turn them into an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the unit dependencies are invalid.
    pub async fn run(&self) -> Result<TeardownReport> {
        let waves = teardown_waves(&self.config.units)?;
        let project = self.config.project.name.as_str();
        let mut report = TeardownReport::default();

        info!(
            "Tearing down {} units of {}",
            self.config.units.len(),
            self.config.qualified_name()
        );

        let cleaner = PreCleaner::new(
            self.clients.object_store.as_ref(),
            self.clients.registry.as_ref(),
            self.config.teardown.direct_delete_limit,
            self.config.teardown.expiration_days,
        );

        self.pre_clean(&cleaner, &mut report).await;

        for wave in waves {
            let units: Vec<String> = wave
                .iter()
                .map(|u| self.config.unit_full_name(u))
                .collect();
            debug!("Deleting wave: {}", units.join(", "));

            let clients = self.clients.clone();
            let owner = project.to_string();
            let settings = self.config.poll_settings();

            let results = run_bounded(units, self.config.concurrency.max_parallel_units, |unit| {
                let clients = clients.clone();
                let owner = owner.clone();
                async move { remove_unit(&clients, &owner, settings, &unit).await }
            })
            .await;

            for (unit, result) in results {
                match result {
                    Ok(UnitRemoval::Deleted) => report.deleted.push(unit),
                    Ok(UnitRemoval::Absent) => report.absent.push(unit),
                    Err(e) => {
                        error!("Failed to delete unit {unit}: {e}");
                        report.fail(unit, TeardownStage::Delete, &e);
                    }
                }
            }
        }

        self.sweep(&cleaner, &mut report).await;

        info!(
            "Teardown finished: {} deleted, {} absent, {} failures",
            report.deleted.len(),
            report.absent.len(),
            report.failure_count()
        );
        Ok(report)
    }

    /// Discovers and pre-cleans every unit's buckets and repositories.
    async fn pre_clean(&self, cleaner: &PreCleaner<'_>, report: &mut TeardownReport) {
        let walker = ResourceWalker::new(self.clients.engine.as_ref(), &self.config.project.name);

        for unit in &self.config.units {
            let full_name = self.config.unit_full_name(&unit.name);

            let records = match walker.walk(&full_name).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Could not walk unit {full_name}: {e}");
                    report.fail(full_name, TeardownStage::Discover, &e);
                    continue;
                }
            };

            for target in records.iter().filter_map(CleanupTarget::from_record) {
                match cleaner.clean(&target).await {
                    Ok(action) => report.pre_clean.push(action),
                    Err(e) => {
                        warn!("Pre-clean of {} failed: {e}", target.name);
                        report.fail(target.name, TeardownStage::PreClean, &e);
                    }
                }
            }
        }
    }

    /// Removes tagged buckets whose owning unit no longer exists.
    async fn sweep(&self, cleaner: &PreCleaner<'_>, report: &mut TeardownReport) {
        let project = &self.config.project;
        let store = self.clients.object_store.as_ref();

        let buckets = match store.list_tagged_buckets(TAG_PROJECT, &project.name).await {
            Ok(buckets) => buckets,
            Err(e) => {
                warn!("Could not list tagged buckets: {e}");
                report.fail(project.name.clone(), TeardownStage::PostClean, &e);
                return;
            }
        };

        for bucket in buckets {
            if bucket.tags.get(TAG_ENV).is_some_and(|env| *env != project.environment) {
                continue;
            }
            let Some(unit) = bucket.tags.get(TAG_UNIT) else {
                continue;
            };

            let full_name = self.config.unit_full_name(unit);
            match self.clients.engine.describe_unit(&full_name).await {
                Ok(Some(live)) if !live.status.is_deleted() => continue,
                Ok(_) => {}
                Err(e) => {
                    report.fail(bucket.name, TeardownStage::PostClean, &e);
                    continue;
                }
            }

            info!("Sweeping bucket {} left by unit {full_name}", bucket.name);
            match cleaner.empty_bucket(&bucket.name).await {
                Ok(action @ PreCleanAction::ExpirationPolicy { .. }) => {
                    warn!("Bucket {} will be removable once it expires", bucket.name);
                    report.pre_clean.push(action);
                }
                Ok(action) => {
                    report.pre_clean.push(action);
                    match store.delete_bucket(&bucket.name).await {
                        Ok(()) => report.swept.push(bucket.name),
                        Err(e) => report.fail(bucket.name, TeardownStage::PostClean, &e),
                    }
                }
                Err(e) => report.fail(bucket.name, TeardownStage::PostClean, &e),
            }
        }
    }
}

/// Deletes one unit unless it is already gone.
async fn remove_unit(
    clients: &Clients,
    project: &str,
    settings: crate::engine::PollSettings,
    unit: &str,
) -> Result<UnitRemoval> {
    let Some(live) = clients.engine.describe_unit(unit).await? else {
        debug!("Unit {unit} does not exist");
        return Ok(UnitRemoval::Absent);
    };

    if live.status.is_deleted() {
        return Ok(UnitRemoval::Absent);
    }

    if live.tags.get(TAG_PROJECT).map(String::as_str) != Some(project) {
        warn!("Unit {unit} is not owned by project {project}; leaving it alone");
        return Ok(UnitRemoval::Absent);
    }

    ChangeExecutor::new(clients, project, settings)
        .delete_unit(unit)
        .await?;
    Ok(UnitRemoval::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UnitStatus;
    use crate::error::{FleetError, TeardownError};
    use crate::testing::{fake_clients_with_store, test_config, FakeEngine, FakeObjectStore};

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_others() {
        let config = test_config(&["a", "b", "c"]);
        let engine = FakeEngine::new();
        let store = FakeObjectStore::new();
        for unit in ["a", "b", "c"] {
            engine.add_unit(&config.unit_full_name(unit), "shop", UnitStatus::CreateComplete);
        }
        engine.add_resource("shop-dev-b", "Logs", "AWS::S3::Bucket", "CREATE_COMPLETE", None);
        engine.set_physical_id("shop-dev-b", "Logs", "shop-dev-b-logs");
        store.add_bucket("shop-dev-b-logs", &[], 50_000);
        engine.fail_delete(
            "shop-dev-b",
            &[("Logs", "The bucket you tried to delete is not empty")],
        );
        let (clients, _) = fake_clients_with_store(engine.clone(), store.clone());

        let report = TeardownEngine::new(&clients, &config).run().await.expect("run");

        assert_eq!(report.deleted, vec!["shop-dev-a", "shop-dev-c"]);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.failures[0].target, "shop-dev-b");
        assert_eq!(report.failures[0].diagnostics[0].logical_id, "Logs");
        assert!(report
            .pre_clean
            .iter()
            .any(|a| matches!(a, PreCleanAction::ExpirationPolicy { bucket, .. } if bucket == "shop-dev-b-logs")));
        assert_eq!(store.delete_calls(), 0);

        match report.into_result() {
            Err(FleetError::Teardown(TeardownError::Partial { failed, total })) => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nested_resources_are_pre_cleaned() {
        let config = test_config(&["app"]);
        let engine = FakeEngine::new();
        let store = FakeObjectStore::new();
        engine.add_unit("shop-dev-app", "shop", UnitStatus::CreateComplete);
        engine.add_unit("shop-dev-app-images", "shop", UnitStatus::CreateComplete);
        engine.add_nested("shop-dev-app", "Images", "shop-dev-app-images");
        engine.add_resource(
            "shop-dev-app-images",
            "Repo",
            "AWS::ECR::Repository",
            "CREATE_COMPLETE",
            None,
        );
        engine.set_physical_id("shop-dev-app-images", "Repo", "shop/app");
        engine.add_resource("shop-dev-app", "Assets", "AWS::S3::Bucket", "CREATE_COMPLETE", None);
        engine.set_physical_id("shop-dev-app", "Assets", "shop-dev-app-assets");
        store.add_bucket("shop-dev-app-assets", &[], 1_500);
        let (clients, _) = fake_clients_with_store(engine.clone(), store.clone());

        let report = TeardownEngine::new(&clients, &config).run().await.expect("run");

        assert_eq!(engine.repositories_deleted(), vec!["shop/app"]);
        assert_eq!(store.version_count("shop-dev-app-assets"), 0);
        assert_eq!(report.deleted, vec!["shop-dev-app"]);
        assert!(matches!(
            report.pre_clean.as_slice(),
            [
                PreCleanAction::RepositoryDeleted { .. },
                PreCleanAction::Emptied { versions: 1_500, .. }
            ]
        ));
    }

    #[tokio::test]
    async fn test_dependents_are_deleted_first() {
        let mut config = test_config(&["backend", "frontend"]);
        config.units[1].depends_on = vec![String::from("backend")];
        let engine = FakeEngine::new();
        engine.add_unit("shop-dev-backend", "shop", UnitStatus::CreateComplete);
        engine.add_unit("shop-dev-frontend", "shop", UnitStatus::CreateComplete);
        let (clients, _) = fake_clients_with_store(engine.clone(), FakeObjectStore::new());

        let report = TeardownEngine::new(&clients, &config).run().await.expect("run");

        assert_eq!(report.failure_count(), 0);
        assert_eq!(
            engine.deleted_units(),
            vec!["shop-dev-frontend", "shop-dev-backend"]
        );
    }

    #[tokio::test]
    async fn test_rerun_after_success_is_a_noop() {
        let config = test_config(&["a"]);
        let engine = FakeEngine::new();
        let (clients, _) = fake_clients_with_store(engine.clone(), FakeObjectStore::new());

        let report = TeardownEngine::new(&clients, &config).run().await.expect("run");

        assert_eq!(report.absent, vec!["shop-dev-a"]);
        assert!(engine.deleted_units().is_empty());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_orphaned_buckets_are_swept() {
        let config = test_config(&["a"]);
        let engine = FakeEngine::new();
        let store = FakeObjectStore::new();
        store.add_bucket(
            "shop-dev-old-data",
            &[(TAG_PROJECT, "shop"), (TAG_ENV, "dev"), (TAG_UNIT, "old")],
            20,
        );
        store.add_bucket(
            "shop-prod-old-data",
            &[(TAG_PROJECT, "shop"), (TAG_ENV, "prod"), (TAG_UNIT, "old")],
            20,
        );
        let (clients, _) = fake_clients_with_store(engine, store.clone());

        let report = TeardownEngine::new(&clients, &config).run().await.expect("run");

        assert_eq!(report.swept, vec!["shop-dev-old-data"]);
        assert!(!store.has_bucket("shop-dev-old-data"));
        assert!(store.has_bucket("shop-prod-old-data"));
    }
}
