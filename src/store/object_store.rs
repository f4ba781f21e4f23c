//! Object-store side channel trait and types.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Maximum number of entries returned per listing page.
pub const LIST_PAGE_SIZE: usize = 1000;

/// Maximum number of keys accepted by one batch delete.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// One object version or delete marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectVersion {
    /// Object key.
    pub key: String,
    /// Version id; `None` for unversioned buckets.
    pub version_id: Option<String>,
}

/// Continuation point of a version listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageToken {
    /// Key to continue after.
    pub key_marker: Option<String>,
    /// Version id to continue after.
    pub version_id_marker: Option<String>,
}

/// One page of object versions.
#[derive(Debug, Clone, Default)]
pub struct VersionPage {
    /// Versions and delete markers on this page.
    pub versions: Vec<ObjectVersion>,
    /// Token for the next page, `None` on the last page.
    pub next: Option<PageToken>,
}

/// One lifecycle rule on a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRule {
    /// Rule id, unique within the bucket.
    pub id: String,
    /// Key prefix the rule applies to; `None` means the whole bucket.
    pub prefix: Option<String>,
    /// Days after which current versions expire.
    pub expiration_days: u32,
    /// Days after which noncurrent versions expire.
    pub noncurrent_expiration_days: Option<u32>,
    /// Whether expired delete markers are removed too.
    pub expire_delete_markers: bool,
}

/// A bucket found by tag discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedBucket {
    /// Bucket name.
    pub name: String,
    /// All tags on the bucket.
    pub tags: HashMap<String, String>,
}

/// Object-store operations used by pre-clean, post-clean and handlers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists one page of object versions and delete markers.
    async fn list_object_versions(
        &self,
        bucket: &str,
        token: Option<&PageToken>,
    ) -> Result<VersionPage>;

    /// Deletes up to [`DELETE_BATCH_SIZE`] versions; returns how many were removed.
    ///
    /// A batch in which any version is refused is an error.
    async fn delete_objects(&self, bucket: &str, objects: &[ObjectVersion]) -> Result<usize>;

    /// Installs or replaces a lifecycle rule, keeping the bucket's other rules.
    async fn put_lifecycle_rule(&self, bucket: &str, rule: &LifecycleRule) -> Result<()>;

    /// Removes a lifecycle rule; a missing rule is not an error.
    async fn delete_lifecycle_rule(&self, bucket: &str, rule_id: &str) -> Result<()>;

    /// Lists buckets carrying the tag `key=value`.
    async fn list_tagged_buckets(&self, key: &str, value: &str) -> Result<Vec<TaggedBucket>>;

    /// Deletes an empty bucket; a missing bucket is not an error.
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}
