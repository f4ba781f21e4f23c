//! S3 implementation of the object-store side channel.

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{
    AbortIncompleteMultipartUpload, BucketLifecycleConfiguration, Delete, ExpirationStatus,
    LifecycleExpiration, NoncurrentVersionExpiration, ObjectIdentifier,
};
use aws_sdk_s3::Client;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result, StoreError};

use super::object_store::{
    LifecycleRule, ObjectStore, ObjectVersion, PageToken, TaggedBucket, VersionPage,
    LIST_PAGE_SIZE,
};

/// Suffix of the companion rule that removes expired delete markers.
const MARKER_RULE_SUFFIX: &str = "-markers";

/// S3-backed object store.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    /// S3 client.
    client: Client,
}

impl S3ObjectStore {
    /// Creates a store from the ambient AWS configuration.
    pub async fn new(region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Self {
            client: Client::new(&config),
        }
    }

    /// Creates a store with an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Reads the bucket's lifecycle rules; no configuration means no rules.
    async fn lifecycle_rules(&self, bucket: &str) -> Result<Vec<aws_sdk_s3::types::LifecycleRule>> {
        match self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(bucket)
            .send()
            .await
        {
            Ok(output) => Ok(output.rules().to_vec()),
            Err(err) if err.code() == Some("NoSuchLifecycleConfiguration") => Ok(Vec::new()),
            Err(err) => Err(store_error("get lifecycle of", bucket, &err)),
        }
    }

    /// Replaces the bucket's lifecycle rules; an empty set removes the configuration.
    async fn write_lifecycle_rules(
        &self,
        bucket: &str,
        rules: Vec<aws_sdk_s3::types::LifecycleRule>,
    ) -> Result<()> {
        if rules.is_empty() {
            return self
                .client
                .delete_bucket_lifecycle()
                .bucket(bucket)
                .send()
                .await
                .map(|_| ())
                .map_err(|err| store_error("delete lifecycle of", bucket, &err));
        }

        let configuration = BucketLifecycleConfiguration::builder()
            .set_rules(Some(rules))
            .build()
            .map_err(|e| StoreError::backend(format!("Invalid lifecycle configuration: {e}")))?;

        self.client
            .put_bucket_lifecycle_configuration()
            .bucket(bucket)
            .lifecycle_configuration(configuration)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| store_error("put lifecycle on", bucket, &err))
    }
}

/// Maps an SDK error to the crate's error classes.
fn store_error<E>(action: &str, bucket: &str, err: &E) -> FleetError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match err.code() {
        Some("ExpiredToken" | "ExpiredTokenException" | "TokenRefreshRequired") => {
            StoreError::CredentialsExpired.into()
        }
        Some("NoSuchBucket") => StoreError::BucketNotFound {
            bucket: bucket.to_string(),
        }
        .into(),
        _ => StoreError::backend(format!(
            "Failed to {action} bucket {bucket}: {}",
            DisplayErrorContext(err)
        ))
        .into(),
    }
}

/// Converts a rule into its S3 form, plus the delete-marker companion rule.
#[allow(deprecated)]
fn to_s3_rules(rule: &LifecycleRule) -> Result<Vec<aws_sdk_s3::types::LifecycleRule>> {
    let prefix = rule.prefix.clone().unwrap_or_default();
    let invalid = |e: aws_sdk_s3::error::BuildError| {
        FleetError::from(StoreError::backend(format!("Invalid lifecycle rule {}: {e}", rule.id)))
    };

    let mut builder = aws_sdk_s3::types::LifecycleRule::builder()
        .id(&rule.id)
        .prefix(&prefix)
        .status(ExpirationStatus::Enabled)
        .expiration(
            LifecycleExpiration::builder()
                .days(i32::try_from(rule.expiration_days).unwrap_or(i32::MAX))
                .build(),
        )
        .abort_incomplete_multipart_upload(
            AbortIncompleteMultipartUpload::builder()
                .days_after_initiation(1)
                .build(),
        );
    if let Some(days) = rule.noncurrent_expiration_days {
        builder = builder.noncurrent_version_expiration(
            NoncurrentVersionExpiration::builder()
                .noncurrent_days(i32::try_from(days).unwrap_or(i32::MAX))
                .build(),
        );
    }

    let mut rules = vec![builder.build().map_err(invalid)?];

    if rule.expire_delete_markers {
        let markers = aws_sdk_s3::types::LifecycleRule::builder()
            .id(format!("{}{MARKER_RULE_SUFFIX}", rule.id))
            .prefix(&prefix)
            .status(ExpirationStatus::Enabled)
            .expiration(
                LifecycleExpiration::builder()
                    .expired_object_delete_marker(true)
                    .build(),
            )
            .build()
            .map_err(invalid)?;
        rules.push(markers);
    }

    Ok(rules)
}

fn is_rule_family(existing: Option<&str>, rule_id: &str) -> bool {
    existing.is_some_and(|id| {
        id == rule_id || id.strip_suffix(MARKER_RULE_SUFFIX) == Some(rule_id)
    })
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_object_versions(
        &self,
        bucket: &str,
        token: Option<&PageToken>,
    ) -> Result<VersionPage> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .max_keys(i32::try_from(LIST_PAGE_SIZE).unwrap_or(1000))
            .set_key_marker(token.and_then(|t| t.key_marker.clone()))
            .set_version_id_marker(token.and_then(|t| t.version_id_marker.clone()))
            .send()
            .await
            .map_err(|err| store_error("list versions in", bucket, &err))?;

        let mut versions: Vec<ObjectVersion> = output
            .versions()
            .iter()
            .filter_map(|v| {
                v.key().map(|key| ObjectVersion {
                    key: key.to_string(),
                    version_id: v.version_id().map(String::from),
                })
            })
            .collect();
        versions.extend(output.delete_markers().iter().filter_map(|m| {
            m.key().map(|key| ObjectVersion {
                key: key.to_string(),
                version_id: m.version_id().map(String::from),
            })
        }));

        let next = if output.is_truncated().unwrap_or(false) {
            Some(PageToken {
                key_marker: output.next_key_marker().map(String::from),
                version_id_marker: output.next_version_id_marker().map(String::from),
            })
        } else {
            None
        };

        debug!("Listed {} versions in {bucket}", versions.len());
        Ok(VersionPage { versions, next })
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectVersion]) -> Result<usize> {
        if objects.is_empty() {
            return Ok(0);
        }

        let identifiers = objects
            .iter()
            .map(|o| {
                ObjectIdentifier::builder()
                    .key(&o.key)
                    .set_version_id(o.version_id.clone())
                    .build()
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StoreError::backend(format!("Invalid object identifier: {e}")))?;

        let delete = Delete::builder()
            .set_objects(Some(identifiers))
            .quiet(true)
            .build()
            .map_err(|e| StoreError::backend(format!("Invalid delete request: {e}")))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|err| store_error("batch delete in", bucket, &err))?;

        batch_errors(bucket, output.errors())?;
        Ok(objects.len())
    }

    async fn put_lifecycle_rule(&self, bucket: &str, rule: &LifecycleRule) -> Result<()> {
        let mut rules: Vec<_> = self
            .lifecycle_rules(bucket)
            .await?
            .into_iter()
            .filter(|r| !is_rule_family(r.id(), &rule.id))
            .collect();
        rules.extend(to_s3_rules(rule)?);

        self.write_lifecycle_rules(bucket, rules).await?;
        info!("Installed lifecycle rule {} on {bucket}", rule.id);
        Ok(())
    }

    async fn delete_lifecycle_rule(&self, bucket: &str, rule_id: &str) -> Result<()> {
        let existing = self.lifecycle_rules(bucket).await?;
        let before = existing.len();
        let remaining: Vec<_> = existing
            .into_iter()
            .filter(|r| !is_rule_family(r.id(), rule_id))
            .collect();

        if remaining.len() == before {
            debug!("Lifecycle rule {rule_id} not present on {bucket}");
            return Ok(());
        }
        self.write_lifecycle_rules(bucket, remaining).await
    }

    async fn list_tagged_buckets(&self, key: &str, value: &str) -> Result<Vec<TaggedBucket>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| store_error("list", "*", &err))?;

        let mut matched = Vec::new();
        for name in output.buckets().iter().filter_map(|b| b.name()) {
            let tagging = match self.client.get_bucket_tagging().bucket(name).send().await {
                Ok(tagging) => tagging,
                Err(err) => {
                    // Untagged buckets and buckets in other regions land here.
                    debug!("Skipping tags of {name}: {}", DisplayErrorContext(&err));
                    continue;
                }
            };

            let tags: HashMap<String, String> = tagging
                .tag_set()
                .iter()
                .map(|t| (t.key().to_string(), t.value().to_string()))
                .collect();

            if tags.get(key).map(String::as_str) == Some(value) {
                matched.push(TaggedBucket {
                    name: name.to_string(),
                    tags,
                });
            }
        }

        Ok(matched)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        match self.client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("Deleted bucket {bucket}");
                Ok(())
            }
            Err(err) if err.code() == Some("NoSuchBucket") => {
                debug!("Bucket {bucket} already removed");
                Ok(())
            }
            Err(err) => Err(store_error("delete", bucket, &err)),
        }
    }
}

/// Fails a batch delete when any of its keys was refused.
fn batch_errors(bucket: &str, errors: &[aws_sdk_s3::types::Error]) -> Result<()> {
    let Some(first) = errors.first() else {
        return Ok(());
    };

    warn!("{} objects in {bucket} could not be deleted", errors.len());
    Err(StoreError::backend(format!(
        "{} objects in {bucket} could not be deleted; first: {} ({}: {})",
        errors.len(),
        first.key().unwrap_or("?"),
        first.code().unwrap_or("unknown"),
        first.message().unwrap_or("no message"),
    ))
    .into())
}
