//! `Custom::BucketLifecycle`: one expiration rule on a bucket.
//!
//! Physical id: `custom:lifecycle:<bucket>:<rule-id>`.

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::Result;
use crate::store::{LifecycleRule, ObjectStore};

use super::decode::{option_u32_lenient, u32_lenient};
use super::envelope::HandlerOutput;
use super::registry::CustomResource;

/// Type tag of the lifecycle handler.
pub const LIFECYCLE_TYPE: &str = "Custom::BucketLifecycle";

const ID_PREFIX: &str = "custom:lifecycle:";
const RULE_PREFIX: &str = "fleetform-";

/// Properties of a lifecycle rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LifecycleProperties {
    /// Bucket the rule is installed on.
    #[validate(length(min = 3, max = 63))]
    pub bucket: String,
    /// Key prefix; the whole bucket when absent.
    #[serde(default)]
    pub rule_prefix: Option<String>,
    /// Days after which current versions expire.
    #[serde(deserialize_with = "u32_lenient")]
    #[validate(range(min = 1, max = 3650))]
    pub expiration_days: u32,
    /// Days after which noncurrent versions expire.
    #[serde(default, deserialize_with = "option_u32_lenient")]
    #[validate(range(min = 1, max = 3650))]
    pub noncurrent_expiration_days: Option<u32>,
}

/// Rule id for a logical resource.
fn rule_id(logical_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(logical_id.as_bytes()));
    format!("{RULE_PREFIX}{}", &digest[..12])
}

/// Splits a physical id into bucket and rule id.
fn parse_id(physical_id: &str) -> Option<(&str, &str)> {
    let (bucket, rule) = physical_id.strip_prefix(ID_PREFIX)?.split_once(':')?;
    (!bucket.is_empty() && rule.starts_with(RULE_PREFIX)).then_some((bucket, rule))
}

/// Handler for `Custom::BucketLifecycle`.
#[derive(Clone)]
pub struct LifecycleHandler {
    store: Arc<dyn ObjectStore>,
}

impl LifecycleHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    async fn install(&self, logical_id: &str, props: &LifecycleProperties) -> Result<HandlerOutput> {
        let rule = LifecycleRule {
            id: rule_id(logical_id),
            prefix: props.rule_prefix.clone(),
            expiration_days: props.expiration_days,
            noncurrent_expiration_days: props.noncurrent_expiration_days,
            expire_delete_markers: false,
        };

        info!("Installing lifecycle rule {} on {}", rule.id, props.bucket);
        self.store.put_lifecycle_rule(&props.bucket, &rule).await?;

        let physical_id = self.physical_id(logical_id, props);
        Ok(HandlerOutput {
            outputs: self.outputs(&physical_id, props),
            physical_id,
        })
    }
}

#[async_trait]
impl CustomResource for LifecycleHandler {
    type Properties = LifecycleProperties;
    const TYPE_TAG: &'static str = LIFECYCLE_TYPE;

    fn physical_id(&self, logical_id: &str, props: &LifecycleProperties) -> String {
        format!("{ID_PREFIX}{}:{}", props.bucket, rule_id(logical_id))
    }

    async fn create(&self, logical_id: &str, props: &LifecycleProperties) -> Result<HandlerOutput> {
        self.install(logical_id, props).await
    }

    async fn update(
        &self,
        logical_id: &str,
        physical_id: &str,
        props: &LifecycleProperties,
        _old: Option<&LifecycleProperties>,
    ) -> Result<HandlerOutput> {
        let output = self.install(logical_id, props).await?;
        if output.physical_id != physical_id {
            debug!("Lifecycle rule moved from {physical_id} to {}", output.physical_id);
        }
        Ok(output)
    }

    async fn delete(&self, physical_id: &str) -> Result<()> {
        let Some((bucket, rule)) = parse_id(physical_id) else {
            warn!("Ignoring delete of unrecognised lifecycle id '{physical_id}'");
            return Ok(());
        };

        match self.store.delete_lifecycle_rule(bucket, rule).await {
            Err(e) if e.is_not_found() => {
                debug!("Bucket {bucket} already gone");
                Ok(())
            }
            other => other,
        }
    }

    fn outputs(&self, physical_id: &str, props: &LifecycleProperties) -> HashMap<String, String> {
        let rule = parse_id(physical_id).map(|(_, r)| r.to_string()).unwrap_or_default();
        HashMap::from([
            (String::from("RuleId"), rule),
            (String::from("Bucket"), props.bucket.clone()),
        ])
    }
}
