//! `Custom::Alarms`: a set of metric alarms for one service.
//!
//! Physical id: `custom:alarms:<service>:<set>`, where `<set>` is derived
//! from the logical id and service. Every alarm in the set is named
//! `<service>-<set>-<alarm>`, so DELETE finds them all from the id alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::engine::{AlarmDefinition, AlarmService, Comparison};
use crate::error::Result;

use super::decode::{f64_lenient, u32_lenient};
use super::envelope::HandlerOutput;
use super::registry::CustomResource;

/// Type tag of the alarms handler.
pub const ALARMS_TYPE: &str = "Custom::Alarms";

const ID_PREFIX: &str = "custom:alarms:";
const SET_LEN: usize = 12;

/// Properties of an alarm set.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AlarmsProperties {
    /// Service the alarms watch.
    #[validate(length(min = 1, max = 64), custom(function = "plain_name"))]
    pub service: String,
    /// Alarms in the set.
    #[validate(length(min = 1, max = 50), nested)]
    pub alarms: Vec<AlarmSpec>,
}

/// One alarm in a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AlarmSpec {
    /// Short alarm name, unique within the set.
    #[validate(length(min = 1, max = 64), custom(function = "plain_name"))]
    pub name: String,
    /// Metric watched.
    #[validate(length(min = 1, max = 255))]
    pub metric: String,
    /// Threshold.
    #[serde(deserialize_with = "f64_lenient")]
    pub threshold: f64,
    /// Comparison operator.
    pub comparison: Comparison,
    /// Evaluation period in seconds.
    #[serde(default = "default_period_secs", deserialize_with = "u32_lenient")]
    #[validate(range(min = 10, max = 86_400))]
    pub period_secs: u32,
    /// Breaching periods before the alarm fires.
    #[serde(default = "default_evaluation_periods", deserialize_with = "u32_lenient")]
    #[validate(range(min = 1, max = 100))]
    pub evaluation_periods: u32,
}

const fn default_period_secs() -> u32 {
    60
}

const fn default_evaluation_periods() -> u32 {
    1
}

/// Alarm names are matched by prefix, so only `[A-Za-z0-9_-]` is allowed.
fn plain_name(value: &str) -> std::result::Result<(), validator::ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(validator::ValidationError::new("plain_name"))
    }
}

/// Parsed alarm set identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmSetId {
    service: String,
    set: String,
}

impl AlarmSetId {
    /// Derives the identity of a set from its logical id and service.
    #[must_use]
    pub fn derive(logical_id: &str, service: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(logical_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(service.as_bytes());
        let digest = hex::encode(hasher.finalize());

        Self {
            service: service.to_string(),
            set: digest[..SET_LEN].to_string(),
        }
    }

    /// Parses a physical id; `None` if it is not one this handler issued.
    #[must_use]
    pub fn parse(physical_id: &str) -> Option<Self> {
        let (service, set) = physical_id.strip_prefix(ID_PREFIX)?.split_once(':')?;

        let valid = !service.is_empty()
            && set.len() == SET_LEN
            && set.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());

        valid.then(|| Self {
            service: service.to_string(),
            set: set.to_string(),
        })
    }

    /// Physical id of the set.
    #[must_use]
    pub fn physical_id(&self) -> String {
        format!("{ID_PREFIX}{}:{}", self.service, self.set)
    }

    /// Prefix shared by every alarm name in the set.
    #[must_use]
    pub fn alarm_prefix(&self) -> String {
        format!("{}-{}-", self.service, self.set)
    }
}

/// Handler for `Custom::Alarms`.
#[derive(Clone)]
pub struct AlarmsHandler {
    alarms: Arc<dyn AlarmService>,
}

impl AlarmsHandler {
    /// Creates the handler.
    #[must_use]
    pub fn new(alarms: Arc<dyn AlarmService>) -> Self {
        Self { alarms }
    }

    /// Puts every alarm of the set and removes alarms no longer listed.
    async fn converge(&self, logical_id: &str, props: &AlarmsProperties) -> Result<HandlerOutput> {
        let id = AlarmSetId::derive(logical_id, &props.service);
        let prefix = id.alarm_prefix();

        let mut wanted = HashSet::new();
        for spec in &props.alarms {
            let definition = AlarmDefinition {
                name: format!("{prefix}{}", spec.name),
                metric: spec.metric.clone(),
                threshold: spec.threshold,
                comparison: spec.comparison,
                period_secs: spec.period_secs,
                evaluation_periods: spec.evaluation_periods,
            };
            self.alarms.put_alarm(&definition).await?;
            wanted.insert(definition.name);
        }

        let stale: Vec<String> = self
            .alarms
            .list_alarms(&prefix)
            .await?
            .into_iter()
            .filter(|name| !wanted.contains(name))
            .collect();

        if !stale.is_empty() {
            info!("Removing {} stale alarms under {prefix}", stale.len());
            self.alarms.delete_alarms(&stale).await?;
        }

        let physical_id = id.physical_id();
        Ok(HandlerOutput {
            outputs: self.outputs(&physical_id, props),
            physical_id,
        })
    }
}

#[async_trait]
impl CustomResource for AlarmsHandler {
    type Properties = AlarmsProperties;
    const TYPE_TAG: &'static str = ALARMS_TYPE;

    fn physical_id(&self, logical_id: &str, props: &AlarmsProperties) -> String {
        AlarmSetId::derive(logical_id, &props.service).physical_id()
    }

    async fn create(&self, logical_id: &str, props: &AlarmsProperties) -> Result<HandlerOutput> {
        self.converge(logical_id, props).await
    }

    async fn update(
        &self,
        logical_id: &str,
        physical_id: &str,
        props: &AlarmsProperties,
        _old: Option<&AlarmsProperties>,
    ) -> Result<HandlerOutput> {
        let output = self.converge(logical_id, props).await?;
        if output.physical_id != physical_id {
            info!("Alarm set {physical_id} replaced by {}", output.physical_id);
        }
        Ok(output)
    }

    async fn delete(&self, physical_id: &str) -> Result<()> {
        let Some(id) = AlarmSetId::parse(physical_id) else {
            warn!("Ignoring delete of unrecognised alarm set id '{physical_id}'");
            return Ok(());
        };

        let names = self.alarms.list_alarms(&id.alarm_prefix()).await?;
        if names.is_empty() {
            debug!("Alarm set {physical_id} already removed");
            return Ok(());
        }

        info!("Deleting {} alarms of set {physical_id}", names.len());
        self.alarms.delete_alarms(&names).await
    }

    fn outputs(&self, physical_id: &str, props: &AlarmsProperties) -> HashMap<String, String> {
        let prefix = AlarmSetId::parse(physical_id)
            .map(|id| id.alarm_prefix())
            .unwrap_or_default();

        HashMap::from([
            (String::from("AlarmPrefix"), prefix),
            (String::from("AlarmCount"), props.alarms.len().to_string()),
        ])
    }
}
