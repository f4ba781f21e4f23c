//! Change planning for one deployment unit.
//!
//! The planner decides between CREATE and UPDATE, submits a change request
//! (or attaches to one already pending), and waits for the engine to
//! evaluate it. An evaluated request is either ready to apply, empty, or
//! failed; only the first reaches the executor.

use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::clients::Clients;
use crate::config::{ConfigHasher, FleetConfig, UnitConfig, TAG_UNIT};
use crate::engine::{
    poll_until, ChangeKind, ChangeRequest, NewChangeRequest, PollSettings, Probe,
    RawChangeStatus, UnitStatus,
};
use crate::error::{PlanError, Result};

use super::executor::ChangeExecutor;

/// Prefix of every change request name.
pub const CHANGE_NAME_PREFIX: &str = "fleetform";

/// Status reasons the engine uses when a proposal contains no changes.
const NO_CHANGE_REASONS: &[&str] = &[
    "The submitted information didn't contain changes",
    "No updates are to be performed",
];

/// Returns true if a failed change request's reason means "nothing to do".
///
/// This is the only place that matches the engine's wording.
#[must_use]
pub fn is_no_change_reason(reason: &str) -> bool {
    NO_CHANGE_REASONS.iter().any(|s| reason.contains(s))
}

/// Generates a unique change request name.
///
/// Names sort by submission time; the random suffix separates concurrent
/// submissions within the same millisecond.
#[must_use]
pub fn change_name(prefix: &str) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{stamp}-{}", &suffix[..8])
}

/// Classified status of a change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeStatus {
    /// The engine is still evaluating.
    Pending,
    /// Evaluated with a non-empty diff.
    Ready,
    /// Evaluated with an empty diff.
    NoChanges,
    /// Evaluation failed.
    Failed(String),
}

impl ChangeStatus {
    /// Classifies a change request.
    #[must_use]
    pub fn classify(request: &ChangeRequest) -> Self {
        match request.status {
            RawChangeStatus::CreatePending | RawChangeStatus::CreateInProgress => Self::Pending,
            RawChangeStatus::CreateComplete => Self::Ready,
            RawChangeStatus::Failed => {
                let reason = request.status_reason.clone().unwrap_or_default();
                if is_no_change_reason(&reason) {
                    Self::NoChanges
                } else {
                    Self::Failed(reason)
                }
            }
            RawChangeStatus::DeletePending | RawChangeStatus::DeleteComplete => {
                Self::Failed(String::from("change request was discarded"))
            }
        }
    }
}

/// A change request the engine evaluated as ready to apply.
///
/// Only obtainable from a request whose status is ready, so an empty or
/// failed proposal can never be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyChange {
    unit: String,
    id: String,
    name: String,
    kind: ChangeKind,
}

impl ReadyChange {
    /// Wraps a change request that is ready to apply.
    #[must_use]
    pub fn from_request(request: &ChangeRequest) -> Option<Self> {
        (ChangeStatus::classify(request) == ChangeStatus::Ready && !request.executing).then(|| {
            Self {
                unit: request.unit.clone(),
                id: request.id.clone(),
                name: request.name.clone(),
                kind: request.kind,
            }
        })
    }

    /// Unit the change applies to.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Engine id of the change request.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the change request.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// CREATE or UPDATE.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.kind
    }
}

/// Result of planning one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    /// Live state already matches; carries the unit's current outputs.
    NoChanges {
        /// Outputs of the unit as it is.
        outputs: HashMap<String, String>,
    },
    /// A change is ready for the executor.
    Ready(ReadyChange),
    /// Another change is executing on the unit; wait for it and plan again.
    InFlight,
}

/// Desired state of one unit, resolved for the engine.
#[derive(Debug, Clone)]
pub struct DesiredUnit {
    /// Engine-side unit name.
    pub name: String,
    /// Staged template location.
    pub template: String,
    /// Template parameters.
    pub parameters: HashMap<String, String>,
    /// Ownership tags plus the unit's own tags.
    pub tags: HashMap<String, String>,
    /// Hash of template and parameters.
    pub hash: String,
}

impl DesiredUnit {
    /// Resolves a configured unit.
    #[must_use]
    pub fn from_config(config: &FleetConfig, unit: &UnitConfig) -> Self {
        let mut tags = unit.tags.clone();
        tags.extend(config.ownership_tags());
        tags.insert(TAG_UNIT.to_string(), unit.name.clone());

        Self {
            name: config.unit_full_name(&unit.name),
            template: config.template_location(unit),
            parameters: unit.parameters.clone(),
            tags,
            hash: ConfigHasher::new().hash_unit(config, unit),
        }
    }

    /// Description attached to change requests for this desired state.
    #[must_use]
    pub fn change_description(&self) -> String {
        format!("fleetform desired-state {}", self.hash)
    }
}

/// Plans changes for units.
pub struct ChangePlanner<'a> {
    /// Client bundle.
    clients: &'a Clients,
    /// Project the units belong to.
    project: &'a str,
    /// Poll settings for every wait.
    settings: PollSettings,
}

impl<'a> ChangePlanner<'a> {
    /// Creates a new planner.
    #[must_use]
    pub const fn new(clients: &'a Clients, project: &'a str, settings: PollSettings) -> Self {
        Self {
            clients,
            project,
            settings,
        }
    }

    /// Plans the next change for a unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the change request fails for a reason other than
    /// "no changes", if the unit is in a state no change can fix, or if a
    /// wait times out.
    pub async fn plan(&self, desired: &DesiredUnit) -> Result<PlanOutcome> {
        let engine = self.clients.engine.as_ref();
        let live = engine.describe_unit(&desired.name).await?;

        let kind = match live.as_ref().map(|u| &u.status) {
            None | Some(UnitStatus::DeleteComplete) => ChangeKind::Create,
            Some(UnitStatus::RollbackComplete) => {
                warn!(
                    "Unit {} never finished its first create; deleting it before recreating",
                    desired.name
                );
                ChangeExecutor::new(self.clients, self.project, self.settings)
                    .delete_unit(&desired.name)
                    .await?;
                ChangeKind::Create
            }
            Some(status) => {
                if let Some(outcome) = self.resume(desired).await? {
                    return Ok(outcome);
                }
                if *status == UnitStatus::ReviewInProgress {
                    ChangeKind::Create
                } else if status.is_in_progress() {
                    info!("Unit {} is busy ({status}), waiting for it", desired.name);
                    return Ok(PlanOutcome::InFlight);
                } else if status.is_updatable() {
                    ChangeKind::Update
                } else {
                    return Err(PlanError::NotUpdatable {
                        unit: desired.name.clone(),
                        status: status.to_string(),
                    }
                    .into());
                }
            }
        };

        let request = NewChangeRequest {
            unit: desired.name.clone(),
            name: change_name(CHANGE_NAME_PREFIX),
            kind,
            template: desired.template.clone(),
            parameters: desired.parameters.clone(),
            tags: desired.tags.clone(),
            description: desired.change_description(),
        };

        info!(
            "Submitting {kind} change {} for unit {} (desired state {})",
            request.name,
            desired.name,
            ConfigHasher::new().short_hash(&desired.hash)
        );
        let id = engine.create_change_request(&request).await?;

        self.evaluate(&desired.name, &id).await
    }

    /// Attaches to a change request already pending on the unit.
    ///
    /// Pending requests built from another desired state are discarded.
    async fn resume(&self, desired: &DesiredUnit) -> Result<Option<PlanOutcome>> {
        let engine = self.clients.engine.as_ref();
        let description = desired.change_description();

        for request in engine.list_change_requests(&desired.name).await? {
            if request.executing {
                info!(
                    "Change {} is already executing on unit {}",
                    request.name, desired.name
                );
                return Ok(Some(PlanOutcome::InFlight));
            }

            let status = ChangeStatus::classify(&request);
            if !matches!(status, ChangeStatus::Pending | ChangeStatus::Ready) {
                continue;
            }

            if request.description.as_deref() == Some(description.as_str()) {
                info!(
                    "Attaching to pending change {} on unit {}",
                    request.name, desired.name
                );
                return self.evaluate(&desired.name, &request.id).await.map(Some);
            }

            debug!("Discarding stale change {} on unit {}", request.name, desired.name);
            engine.delete_change_request(&desired.name, &request.id).await?;
        }

        Ok(None)
    }

    /// Waits for a change request to be evaluated and interprets the result.
    async fn evaluate(&self, unit: &str, change_id: &str) -> Result<PlanOutcome> {
        let engine = self.clients.engine.as_ref();
        let what = format!("change request {change_id} on unit {unit}");

        let request = poll_until(self.clients.clock.as_ref(), self.settings, &what, || async move {
            let request = engine.describe_change_request(unit, change_id).await?;
            Ok(match ChangeStatus::classify(&request) {
                ChangeStatus::Pending => Probe::Pending(format!("{:?}", request.status)),
                _ => Probe::Done(request),
            })
        })
        .await?;

        match ChangeStatus::classify(&request) {
            ChangeStatus::NoChanges => {
                info!("Unit {unit} is up to date");
                if let Err(e) = engine.delete_change_request(unit, change_id).await {
                    warn!("Could not discard empty change {}: {e}", request.name);
                }
                let outputs = engine
                    .describe_unit(unit)
                    .await?
                    .map(|u| u.outputs)
                    .unwrap_or_default();
                Ok(PlanOutcome::NoChanges { outputs })
            }
            ChangeStatus::Failed(reason) => {
                if let Err(e) = engine.delete_change_request(unit, change_id).await {
                    warn!("Could not discard failed change {}: {e}", request.name);
                }
                Err(PlanError::ChangeFailed {
                    unit: unit.to_string(),
                    change: request.name,
                    reason,
                }
                .into())
            }
            ChangeStatus::Ready | ChangeStatus::Pending => Ok(ReadyChange::from_request(&request)
                .map_or(PlanOutcome::InFlight, PlanOutcome::Ready)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DeployError, FleetError};
    use crate::testing::{fake_clients, test_config, FakeEngine};

    fn desired(config: &FleetConfig) -> DesiredUnit {
        DesiredUnit::from_config(config, &config.units[0])
    }

    #[test]
    fn test_no_change_predicate() {
        assert!(is_no_change_reason(
            "The submitted information didn't contain changes. Submit different information to create a change set."
        ));
        assert!(is_no_change_reason("No updates are to be performed."));
        assert!(!is_no_change_reason("Template format error: unresolved resource"));
    }

    #[test]
    fn test_change_names_are_unique_and_ordered() {
        let first = change_name("fleetform");
        let second = change_name("fleetform");

        assert!(first.starts_with("fleetform-"));
        assert_ne!(first, second);
        assert_eq!(first.rsplit('-').next().map(str::len), Some(8));
        assert!(first[..first.len() - 9] <= second[..second.len() - 9]);
    }

    #[test]
    fn test_ready_change_requires_ready_status() {
        let mut request = ChangeRequest {
            id: String::from("c-1"),
            name: String::from("fleetform-x"),
            unit: String::from("shop-dev-app"),
            kind: ChangeKind::Update,
            parameters: HashMap::new(),
            status: RawChangeStatus::Failed,
            status_reason: Some(String::from("No updates are to be performed.")),
            description: None,
            executing: false,
        };
        assert_eq!(ChangeStatus::classify(&request), ChangeStatus::NoChanges);
        assert!(ReadyChange::from_request(&request).is_none());

        request.status = RawChangeStatus::CreateComplete;
        let ready = ReadyChange::from_request(&request).expect("ready");
        assert_eq!(ready.id(), "c-1");
        assert_eq!(ready.kind(), ChangeKind::Update);
    }

    #[tokio::test]
    async fn test_absent_unit_takes_create_path() {
        let engine = FakeEngine::new();
        let (clients, _) = fake_clients(engine.clone());
        let config = test_config(&["app"]);
        let planner = ChangePlanner::new(&clients, "shop", PollSettings::from_secs(1, 60));

        let outcome = planner.plan(&desired(&config)).await.expect("plan");

        let PlanOutcome::Ready(change) = outcome else {
            panic!("expected ready change, got {outcome:?}");
        };
        assert_eq!(change.kind(), ChangeKind::Create);
        assert_eq!(change.unit(), "shop-dev-app");
        assert_eq!(engine.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_diff_returns_existing_outputs() {
        let engine = FakeEngine::new();
        let config = test_config(&["app"]);
        let desired = desired(&config);
        engine.add_unit(&desired.name, "shop", UnitStatus::CreateComplete);
        engine.set_outputs(&desired.name, &[("Url", "https://app.example")]);
        engine.set_live_parameters(&desired.name, &desired.parameters);
        let (clients, _) = fake_clients(engine.clone());

        let planner = ChangePlanner::new(&clients, "shop", PollSettings::from_secs(1, 60));
        let outcome = planner.plan(&desired).await.expect("plan");

        assert_eq!(
            outcome,
            PlanOutcome::NoChanges {
                outputs: HashMap::from([(String::from("Url"), String::from("https://app.example"))]),
            }
        );
        assert_eq!(engine.executions(), 0);
        assert!(engine.change_requests(&desired.name).is_empty());
    }

    #[tokio::test]
    async fn test_second_plan_attaches_to_pending_change() {
        let engine = FakeEngine::new();
        engine.set_evaluation_polls(5);
        let config = test_config(&["app"]);
        let desired = desired(&config);
        let (clients, clock) = fake_clients(engine.clone());

        let short = ChangePlanner::new(&clients, "shop", PollSettings::from_secs(1, 2));
        let first = short.plan(&desired).await;
        assert!(matches!(
            first,
            Err(FleetError::Deploy(DeployError::Timeout { .. }))
        ));
        assert!(clock.sleeps() >= 2);

        let planner = ChangePlanner::new(&clients, "shop", PollSettings::from_secs(1, 60));
        let second = planner.plan(&desired).await.expect("plan");

        assert!(matches!(second, PlanOutcome::Ready(_)));
        assert_eq!(engine.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_executing_change_is_in_flight() {
        let engine = FakeEngine::new();
        let config = test_config(&["app"]);
        let desired = desired(&config);
        engine.add_unit(&desired.name, "shop", UnitStatus::UpdateInProgress);
        let (clients, _) = fake_clients(engine.clone());

        let planner = ChangePlanner::new(&clients, "shop", PollSettings::from_secs(1, 60));
        let outcome = planner.plan(&desired).await.expect("plan");

        assert_eq!(outcome, PlanOutcome::InFlight);
        assert!(engine.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_rolled_back_create_is_replaced() {
        let engine = FakeEngine::new();
        let config = test_config(&["app"]);
        let desired = desired(&config);
        engine.add_unit(&desired.name, "shop", UnitStatus::RollbackComplete);
        let (clients, _) = fake_clients(engine.clone());

        let planner = ChangePlanner::new(&clients, "shop", PollSettings::from_secs(1, 60));
        let outcome = planner.plan(&desired).await.expect("plan");

        let PlanOutcome::Ready(change) = outcome else {
            panic!("expected ready change, got {outcome:?}");
        };
        assert_eq!(change.kind(), ChangeKind::Create);
        assert_eq!(engine.deleted_units(), vec![desired.name.clone()]);
    }

    #[tokio::test]
    async fn test_failed_evaluation_is_fatal() {
        let engine = FakeEngine::new();
        engine.fail_evaluation("Template format error: unresolved resource Foo");
        let config = test_config(&["app"]);
        let (clients, _) = fake_clients(engine.clone());

        let planner = ChangePlanner::new(&clients, "shop", PollSettings::from_secs(1, 60));
        let result = planner.plan(&desired(&config)).await;

        match result {
            Err(FleetError::Plan(PlanError::ChangeFailed { reason, .. })) => {
                assert!(reason.contains("Template format error"));
            }
            other => panic!("expected change failure, got {other:?}"),
        }
        assert_eq!(engine.submitted().len(), 1);
        assert!(engine.change_requests("shop-dev-app").is_empty());
    }
}
