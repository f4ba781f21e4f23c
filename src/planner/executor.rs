//! Change executor for applying ready changes.
//!
//! This module triggers a ready change and blocks until the unit settles,
//! turning a failed apply into a diagnosis of every resource that did not
//! reach a success status.

use std::collections::HashMap;
use tracing::{error, info};

use crate::clients::Clients;
use crate::engine::{poll_until, PollSettings, Probe, UnitDescription};
use crate::error::{DeployError, EngineError, FleetError, Result};
use crate::walker::ResourceWalker;

use super::change::ReadyChange;

/// Executor for ready changes.
pub struct ChangeExecutor<'a> {
    /// Client bundle.
    clients: &'a Clients,
    /// Project the units belong to.
    project: &'a str,
    /// Poll settings for every wait.
    settings: PollSettings,
}

impl<'a> ChangeExecutor<'a> {
    /// Creates a new executor.
    #[must_use]
    pub const fn new(clients: &'a Clients, project: &'a str, settings: PollSettings) -> Self {
        Self {
            clients,
            project,
            settings,
        }
    }

    /// Applies a ready change and returns the unit's outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the apply fails, the unit ends in a failure
    /// status, or the wait times out.
    pub async fn apply(&self, change: ReadyChange) -> Result<HashMap<String, String>> {
        info!(
            "Applying {} change {} to unit {}",
            change.kind(),
            change.name(),
            change.unit()
        );

        self.clients
            .engine
            .execute_change_request(change.unit(), change.id())
            .await?;

        self.wait_for_stable(change.unit()).await
    }

    /// Waits for a unit to reach a success status and returns its outputs.
    ///
    /// Also used to re-attach to an apply started earlier.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::UnitFailed`] with diagnostics if the unit ends
    /// in any other terminal status.
    pub async fn wait_for_stable(&self, unit: &str) -> Result<HashMap<String, String>> {
        let live = self.wait_until_settled(unit).await?;

        if live.status.is_success() {
            info!("Unit {unit} is {}", live.status);
            return Ok(live.outputs);
        }

        let diagnostics = ResourceWalker::new(self.clients.engine.as_ref(), self.project)
            .failed_resources(unit)
            .await?;

        error!("Unit {unit} ended in {}", live.status);
        for diagnostic in &diagnostics {
            error!("  - {diagnostic}");
        }

        Err(DeployError::UnitFailed {
            unit: unit.to_string(),
            status: live.status.to_string(),
            reason: live.status_reason.unwrap_or_default(),
            diagnostics,
        }
        .into())
    }

    /// Deletes a unit and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::UnitFailed`] listing every resource whose
    /// deletion failed if the unit does not go away.
    pub async fn delete_unit(&self, unit: &str) -> Result<()> {
        let engine = self.clients.engine.as_ref();

        info!("Deleting unit {unit}");
        engine.delete_unit(unit).await?;

        let what = format!("deletion of unit {unit}");
        let remaining = poll_until(self.clients.clock.as_ref(), self.settings, &what, || async move {
            Ok(match engine.describe_unit(unit).await? {
                Some(live) if live.status.is_in_progress() => Probe::Pending(live.status.to_string()),
                Some(live) if !live.status.is_deleted() => Probe::Done(Some(live)),
                _ => Probe::Done(None),
            })
        })
        .await?;

        let Some(live) = remaining else {
            info!("Unit {unit} deleted");
            return Ok(());
        };

        let diagnostics = ResourceWalker::new(engine, self.project)
            .delete_failures(unit)
            .await?;

        error!("Unit {unit} could not be deleted ({})", live.status);
        for diagnostic in &diagnostics {
            error!("  - {diagnostic}");
        }

        Err(DeployError::UnitFailed {
            unit: unit.to_string(),
            status: live.status.to_string(),
            reason: live.status_reason.unwrap_or_default(),
            diagnostics,
        }
        .into())
    }

    /// Waits until a unit is no longer in progress, whatever it ends in.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit disappears or the wait times out.
    pub async fn wait_until_settled(&self, unit: &str) -> Result<UnitDescription> {
        let engine = self.clients.engine.as_ref();
        let what = format!("unit {unit}");

        let result = poll_until(self.clients.clock.as_ref(), self.settings, &what, || async move {
            match engine.describe_unit(unit).await? {
                None => Err(FleetError::from(EngineError::not_found("unit", unit))),
                Some(live) if live.status.is_in_progress() => {
                    Ok(Probe::Pending(live.status.to_string()))
                }
                Some(live) => Ok(Probe::Done(live)),
            }
        })
        .await;

        if let Err(e) = &result
            && e.is_credential_expiry()
        {
            error!("Credentials expired while waiting for unit {unit}; re-authenticate and resume");
        }

        result
    }
}
