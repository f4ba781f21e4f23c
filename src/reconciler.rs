//! Reconciler for converging the fleet on its desired state.
//!
//! A deploy runs the configured migrations, then walks the units in
//! dependency waves. Units of one wave are reconciled in parallel on the
//! bounded pool; each goes through the change planner and, when there is
//! something to apply, the change executor. A failed unit does not stop
//! the others, but every unit depending on it is skipped.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clients::Clients;
use crate::config::FleetConfig;
use crate::custom::builtin_registry;
use crate::engine::{ChangeKind, PollSettings};
use crate::error::{DeployError, FleetError, PlanError, Result};
use crate::migration::{MigrationEngine, MigrationReport};
use crate::planner::{deploy_waves, run_bounded, ChangeExecutor, ChangePlanner, DesiredUnit, PlanOutcome};

/// What a deploy did to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitAction {
    /// The unit was created.
    Created,
    /// The unit was updated.
    Updated,
    /// The unit already matched its desired state.
    Unchanged,
    /// Planning or applying failed.
    Failed,
    /// Not attempted because a dependency failed.
    Skipped,
}

impl std::fmt::Display for UnitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Result for one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    /// Unit name within the project.
    pub unit: String,
    /// Engine-side unit name.
    pub full_name: String,
    /// What happened.
    pub action: UnitAction,
    /// Outputs of the unit after the deploy.
    pub outputs: HashMap<String, String>,
    /// Error message for failed and skipped units.
    pub error: Option<String>,
}

/// Result of a deploy run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    /// Migration steps run before the deploy.
    pub migration: MigrationReport,
    /// One entry per unit, in wave order.
    pub units: Vec<UnitReport>,
}

impl DeployReport {
    /// Number of units with the given action.
    #[must_use]
    pub fn count(&self, action: UnitAction) -> usize {
        self.units.iter().filter(|u| u.action == action).count()
    }

    /// Returns true if every unit converged.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.units
            .iter()
            .all(|u| !matches!(u.action, UnitAction::Failed | UnitAction::Skipped))
    }

    /// Looks up the report of one unit.
    #[must_use]
    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.unit == name)
    }

    /// Turns a report with failed or skipped units into an error.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Incomplete`] if any unit did not converge.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(DeployError::Incomplete {
            failed: self.count(UnitAction::Failed) + self.count(UnitAction::Skipped),
            total: self.units.len(),
        }
        .into())
    }
}

impl std::fmt::Display for DeployReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.is_success() { "complete" } else { "incomplete" };
        writeln!(f, "Deploy {status}:")?;
        writeln!(f, "  Created: {}", self.count(UnitAction::Created))?;
        writeln!(f, "  Updated: {}", self.count(UnitAction::Updated))?;
        writeln!(f, "  Unchanged: {}", self.count(UnitAction::Unchanged))?;

        for unit in self.units.iter().filter(|u| u.error.is_some()) {
            let message = unit.error.as_deref().unwrap_or_default();
            writeln!(f, "  [{}] {}: {message}", unit.action, unit.unit)?;
        }

        Ok(())
    }
}

/// Reconciler for the whole fleet.
pub struct Reconciler<'a> {
    /// Client bundle.
    clients: &'a Clients,
    /// Fleet configuration.
    config: &'a FleetConfig,
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(clients: &'a Clients, config: &'a FleetConfig) -> Self {
        Self { clients, config }
    }

    /// Runs migrations, then deploys every unit.
    ///
    /// Per-unit failures are itemized in the report; use
    /// [`DeployReport::into_result`] to turn them into an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a custom resource type has no handler, the unit
    /// dependencies are invalid, or a migration fails.
    pub async fn reconcile(&self) -> Result<DeployReport> {
        info!("Starting deploy of {}", self.config.qualified_name());

        builtin_registry(self.clients)?.ensure_registered(&self.config.custom_resources.types)?;
        let waves = deploy_waves(&self.config.units)?;

        let migration = MigrationEngine::new(self.clients, self.config).run().await?;
        let mut report = DeployReport {
            migration,
            units: Vec::with_capacity(self.config.units.len()),
        };

        let desired: Arc<HashMap<String, DesiredUnit>> = Arc::new(
            self.config
                .units
                .iter()
                .map(|u| (u.name.clone(), DesiredUnit::from_config(self.config, u)))
                .collect(),
        );
        let mut failed: HashSet<String> = HashSet::new();

        for wave in waves {
            let mut runnable = Vec::with_capacity(wave.len());
            for name in wave {
                match self.failed_dependency(&name, &failed) {
                    Some(dependency) => {
                        let error = DeployError::DependencyFailed {
                            unit: name.clone(),
                            dependency,
                        };
                        warn!("{error}");
                        report.units.push(UnitReport {
                            full_name: self.config.unit_full_name(&name),
                            unit: name.clone(),
                            action: UnitAction::Skipped,
                            outputs: HashMap::new(),
                            error: Some(error.to_string()),
                        });
                        failed.insert(name);
                    }
                    None => runnable.push(name),
                }
            }

            if runnable.is_empty() {
                continue;
            }
            debug!("Deploying wave: {}", runnable.join(", "));

            let clients = self.clients.clone();
            let project = self.config.project.name.clone();
            let settings = self.config.poll_settings();
            let max_attempts = self.config.polling.max_attempts.max(1);
            let desired = desired.clone();

            let results = run_bounded(runnable, self.config.concurrency.max_parallel_units, |name| {
                let clients = clients.clone();
                let project = project.clone();
                let unit = desired.get(&name).cloned();
                async move {
                    let unit = unit.ok_or_else(|| FleetError::internal(format!("unknown unit {name}")))?;
                    deploy_unit(&clients, &project, settings, max_attempts, &unit).await
                }
            })
            .await;

            for (name, result) in results {
                let full_name = self.config.unit_full_name(&name);
                match result {
                    Ok((action, outputs)) => {
                        info!("Unit {full_name} {action}");
                        report.units.push(UnitReport {
                            unit: name,
                            full_name,
                            action,
                            outputs,
                            error: None,
                        });
                    }
                    Err(e) => {
                        error!("Unit {full_name} failed: {e}");
                        report.units.push(UnitReport {
                            unit: name.clone(),
                            full_name,
                            action: UnitAction::Failed,
                            outputs: HashMap::new(),
                            error: Some(e.to_string()),
                        });
                        failed.insert(name);
                    }
                }
            }
        }

        info!(
            "Deploy finished: {} created, {} updated, {} unchanged, {} failed",
            report.count(UnitAction::Created),
            report.count(UnitAction::Updated),
            report.count(UnitAction::Unchanged),
            report.count(UnitAction::Failed) + report.count(UnitAction::Skipped)
        );
        Ok(report)
    }

    /// First dependency of `unit` that failed or was skipped.
    fn failed_dependency(&self, unit: &str, failed: &HashSet<String>) -> Option<String> {
        self.config
            .unit(unit)?
            .depends_on
            .iter()
            .find(|d| failed.contains(*d))
            .cloned()
    }
}

/// Plans and applies one unit, waiting out operations already in flight.
async fn deploy_unit(
    clients: &Clients,
    project: &str,
    settings: PollSettings,
    max_attempts: u32,
    desired: &DesiredUnit,
) -> Result<(UnitAction, HashMap<String, String>)> {
    let planner = ChangePlanner::new(clients, project, settings);
    let executor = ChangeExecutor::new(clients, project, settings);

    for attempt in 1..=max_attempts {
        match planner.plan(desired).await? {
            PlanOutcome::NoChanges { outputs } => return Ok((UnitAction::Unchanged, outputs)),
            PlanOutcome::Ready(change) => {
                let action = match change.kind() {
                    ChangeKind::Create => UnitAction::Created,
                    ChangeKind::Update => UnitAction::Updated,
                };
                let outputs = executor.apply(change).await?;
                return Ok((action, outputs));
            }
            PlanOutcome::InFlight => {
                debug!(
                    "Unit {} busy on attempt {attempt}/{max_attempts}, waiting for it to settle",
                    desired.name
                );
                executor.wait_until_settled(&desired.name).await?;
            }
        }
    }

    Err(PlanError::StillBusy {
        unit: desired.name.clone(),
        attempts: max_attempts,
    }
    .into())
}
