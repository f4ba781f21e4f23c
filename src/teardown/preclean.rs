//! Pre-deletion cleanup of resources the engine cannot delete while full.
//!
//! Buckets are emptied directly when small enough; larger buckets get a
//! short expiration policy instead of one oversized delete. Repositories
//! are force-deleted together with their images.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{ContainerRegistry, ResourceRecord, BUCKET_TYPE, REPOSITORY_TYPE};
use crate::error::Result;
use crate::store::{LifecycleRule, ObjectStore, ObjectVersion, DELETE_BATCH_SIZE};

/// Id of the lifecycle rule installed on buckets too large to empty directly.
pub const TEARDOWN_RULE_ID: &str = "fleetform-teardown-expire";

/// Kind of resource needing cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CleanupKind {
    /// Object store bucket.
    Bucket,
    /// Container image repository.
    Repository,
}

/// A resource to clean before its unit is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupTarget {
    /// Unit owning the resource.
    pub unit: String,
    /// Kind of resource.
    pub kind: CleanupKind,
    /// Bucket or repository name.
    pub name: String,
}

impl CleanupTarget {
    /// Builds a target from a resource record, if its kind needs cleanup.
    #[must_use]
    pub fn from_record(record: &ResourceRecord) -> Option<Self> {
        let kind = match record.type_tag.as_str() {
            BUCKET_TYPE => CleanupKind::Bucket,
            REPOSITORY_TYPE => CleanupKind::Repository,
            _ => return None,
        };

        Some(Self {
            unit: record.unit.clone(),
            kind,
            name: record.physical_id.clone()?,
        })
    }
}

/// What pre-clean did to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PreCleanAction {
    /// Every version was deleted directly.
    Emptied {
        /// Bucket name.
        bucket: String,
        /// Versions and delete markers removed.
        versions: usize,
    },
    /// The bucket was over the bound; an expiration rule was installed.
    ExpirationPolicy {
        /// Bucket name.
        bucket: String,
        /// Installed rule id.
        rule_id: String,
    },
    /// The repository and its images were deleted.
    RepositoryDeleted {
        /// Repository name.
        repository: String,
    },
    /// Nothing left to clean.
    AlreadyGone {
        /// Resource name.
        name: String,
    },
}

impl std::fmt::Display for PreCleanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emptied { bucket, versions } => {
                write!(f, "emptied {bucket} ({versions} versions)")
            }
            Self::ExpirationPolicy { bucket, rule_id } => {
                write!(f, "installed {rule_id} on {bucket}")
            }
            Self::RepositoryDeleted { repository } => write!(f, "deleted repository {repository}"),
            Self::AlreadyGone { name } => write!(f, "{name} already gone"),
        }
    }
}

/// Runs pre-clean against the object store and the registry.
pub struct PreCleaner<'a> {
    store: &'a dyn ObjectStore,
    registry: &'a dyn ContainerRegistry,
    direct_delete_limit: usize,
    expiration_days: u32,
}

impl<'a> PreCleaner<'a> {
    /// Creates a pre-cleaner.
    #[must_use]
    pub const fn new(
        store: &'a dyn ObjectStore,
        registry: &'a dyn ContainerRegistry,
        direct_delete_limit: usize,
        expiration_days: u32,
    ) -> Self {
        Self {
            store,
            registry,
            direct_delete_limit,
            expiration_days,
        }
    }

    /// Cleans one target.
    ///
    /// # Errors
    ///
    /// Returns an error if listing, deleting or installing the policy fails.
    pub async fn clean(&self, target: &CleanupTarget) -> Result<PreCleanAction> {
        match target.kind {
            CleanupKind::Bucket => self.empty_bucket(&target.name).await,
            CleanupKind::Repository => {
                info!("Force-deleting repository {}", target.name);
                self.registry.force_delete_repository(&target.name).await?;
                Ok(PreCleanAction::RepositoryDeleted {
                    repository: target.name.clone(),
                })
            }
        }
    }

    /// Empties a bucket, or installs an expiration policy if it is too large.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails for a reason other than the
    /// bucket being gone.
    pub async fn empty_bucket(&self, bucket: &str) -> Result<PreCleanAction> {
        let versions = match self.collect_versions(bucket).await {
            Ok(versions) => versions,
            Err(e) if e.is_not_found() => {
                debug!("Bucket {bucket} already gone");
                return Ok(PreCleanAction::AlreadyGone {
                    name: bucket.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let Some(versions) = versions else {
            warn!(
                "Bucket {bucket} holds more than {} versions; installing an expiration policy",
                self.direct_delete_limit
            );
            let rule = LifecycleRule {
                id: TEARDOWN_RULE_ID.to_string(),
                prefix: None,
                expiration_days: self.expiration_days,
                noncurrent_expiration_days: Some(self.expiration_days),
                expire_delete_markers: true,
            };
            self.store.put_lifecycle_rule(bucket, &rule).await?;
            return Ok(PreCleanAction::ExpirationPolicy {
                bucket: bucket.to_string(),
                rule_id: rule.id,
            });
        };

        let mut removed = 0;
        for batch in versions.chunks(DELETE_BATCH_SIZE) {
            removed += self.store.delete_objects(bucket, batch).await?;
        }

        info!("Emptied bucket {bucket} ({removed} versions)");
        Ok(PreCleanAction::Emptied {
            bucket: bucket.to_string(),
            versions: removed,
        })
    }

    /// Lists every version, or `None` as soon as the bound is exceeded.
    async fn collect_versions(&self, bucket: &str) -> Result<Option<Vec<ObjectVersion>>> {
        let mut versions = Vec::new();
        let mut token = None;

        loop {
            let page = self.store.list_object_versions(bucket, token.as_ref()).await?;
            versions.extend(page.versions);

            if versions.len() > self.direct_delete_limit {
                return Ok(None);
            }

            match page.next {
                Some(next) => token = Some(next),
                None => return Ok(Some(versions)),
            }
        }
    }
}
