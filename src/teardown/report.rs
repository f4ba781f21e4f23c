//! Teardown report.

use serde::Serialize;

use crate::error::{FleetError, ResourceDiagnostic, Result, TeardownError};

use super::preclean::PreCleanAction;

/// Step of the teardown a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownStage {
    /// Walking a unit for resources to clean.
    Discover,
    /// Emptying a bucket or deleting a repository.
    PreClean,
    /// Deleting a unit.
    Delete,
    /// Sweeping orphaned buckets.
    PostClean,
}

impl std::fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discover => "discover",
            Self::PreClean => "pre-clean",
            Self::Delete => "delete",
            Self::PostClean => "post-clean",
        };
        f.write_str(name)
    }
}

/// One failed teardown step.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownFailure {
    /// Unit, bucket or repository the step was about.
    pub target: String,
    /// Step that failed.
    pub stage: TeardownStage,
    /// Error message.
    pub error: String,
    /// Resources whose deletion failed, for unit deletes.
    pub diagnostics: Vec<ResourceDiagnostic>,
}

/// Itemized result of a teardown run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    /// Units deleted by this run.
    pub deleted: Vec<String>,
    /// Units that did not exist.
    pub absent: Vec<String>,
    /// Pre-clean actions, in order.
    pub pre_clean: Vec<PreCleanAction>,
    /// Orphaned buckets removed by the post-clean sweep.
    pub swept: Vec<String>,
    /// Every failed step.
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Number of failed steps.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Number of units attempted.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        let failed_units = self
            .failures
            .iter()
            .filter(|f| f.stage == TeardownStage::Delete)
            .count();
        self.deleted.len() + self.absent.len() + failed_units
    }

    /// Records a failure.
    pub fn fail(&mut self, target: impl Into<String>, stage: TeardownStage, error: &FleetError) {
        let diagnostics = match error {
            FleetError::Deploy(crate::error::DeployError::UnitFailed { diagnostics, .. }) => {
                diagnostics.clone()
            }
            _ => Vec::new(),
        };

        self.failures.push(TeardownFailure {
            target: target.into(),
            stage,
            error: error.to_string(),
            diagnostics,
        });
    }

    /// Turns a report with failures into [`TeardownError::Partial`].
    ///
    /// # Errors
    ///
    /// Returns an error if any step failed.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(TeardownError::Partial {
                failed: self.failure_count(),
                total: self.unit_count(),
            }
            .into())
        }
    }
}

impl std::fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.failures.is_empty() { "complete" } else { "incomplete" };
        writeln!(f, "Teardown {status}:")?;
        writeln!(f, "  Deleted: {}", self.deleted.len())?;
        writeln!(f, "  Absent: {}", self.absent.len())?;
        writeln!(f, "  Pre-clean actions: {}", self.pre_clean.len())?;
        writeln!(f, "  Swept buckets: {}", self.swept.len())?;

        if !self.failures.is_empty() {
            writeln!(f, "  Failures ({}):", self.failure_count())?;
            for failure in &self.failures {
                writeln!(f, "    - [{}] {}: {}", failure.stage, failure.target, failure.error)?;
                for diagnostic in &failure.diagnostics {
                    writeln!(f, "        {diagnostic}")?;
                }
            }
        }

        Ok(())
    }
}
