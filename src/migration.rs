//! Pre-deploy migration engine.
//!
//! Removes resource shapes that must no longer exist before the next
//! deploy runs. The engine cannot delete a single embedded resource, so a
//! unit still holding an obsolete shape is deleted as a whole and recreated
//! by the following apply. Retired multi-region tables are removed in two
//! polled phases: regional replicas first, then the parent definition.
//!
//! Every step treats "already gone" as success, so a migrated environment
//! is left untouched.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clients::Clients;
use crate::config::{FleetConfig, ObsoleteShape};
use crate::engine::{poll_until, Probe};
use crate::error::{MigrationError, Result};
use crate::planner::ChangeExecutor;
use crate::walker::ResourceWalker;

/// What one migration step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MigrationAction {
    /// The unit held an obsolete shape and was deleted.
    UnitRemoved {
        /// Full unit name.
        unit: String,
        /// Logical id of the obsolete resource.
        logical_id: String,
        /// Type tag of the obsolete resource.
        resource_type: String,
    },
    /// The shape was not found.
    ShapeAbsent {
        /// Full unit name.
        unit: String,
        /// Logical id probed for.
        logical_id: String,
    },
    /// The table and all of its replicas were removed.
    TableRemoved {
        /// Table name.
        table: String,
        /// Regions whose replicas were removed.
        replicas: Vec<String>,
    },
    /// The table did not exist.
    TableAbsent {
        /// Table name.
        table: String,
    },
}

impl std::fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnitRemoved {
                unit,
                logical_id,
                resource_type,
            } => write!(f, "removed {unit} (held {resource_type} {logical_id})"),
            Self::ShapeAbsent { unit, logical_id } => write!(f, "{unit}: no {logical_id}"),
            Self::TableRemoved { table, replicas } => {
                write!(f, "removed table {table} ({} replicas)", replicas.len())
            }
            Self::TableAbsent { table } => write!(f, "table {table} already gone"),
        }
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Steps, in order.
    pub actions: Vec<MigrationAction>,
}

impl MigrationReport {
    /// Units deleted by this run.
    #[must_use]
    pub fn removed_units(&self) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                MigrationAction::UnitRemoved { unit, .. } => Some(unit.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns true if nothing had to change.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(|a| {
            matches!(
                a,
                MigrationAction::ShapeAbsent { .. } | MigrationAction::TableAbsent { .. }
            )
        })
    }
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_noop() {
            return writeln!(f, "Nothing to migrate");
        }
        writeln!(f, "Migration steps:")?;
        for action in &self.actions {
            writeln!(f, "  - {action}")?;
        }
        Ok(())
    }
}

/// Runs the configured migrations.
pub struct MigrationEngine<'a> {
    clients: &'a Clients,
    config: &'a FleetConfig,
}

impl<'a> MigrationEngine<'a> {
    /// Creates a migration engine.
    #[must_use]
    pub const fn new(clients: &'a Clients, config: &'a FleetConfig) -> Self {
        Self { clients, config }
    }

    /// Runs every migration step in order and stops at the first failure.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::RemovalFailed`] if a unit holding an
    /// obsolete shape cannot be deleted, or the engine error of a failed
    /// table removal.
    pub async fn run(&self) -> Result<MigrationReport> {
        let migrations = &self.config.migrations;
        let mut report = MigrationReport::default();

        if migrations.obsolete.is_empty() && migrations.retired_tables.is_empty() {
            debug!("No migrations configured");
            return Ok(report);
        }

        for shape in &migrations.obsolete {
            report.actions.push(self.remove_shape(shape).await?);
        }

        for table in &migrations.retired_tables {
            report.actions.push(self.remove_table(&table.name).await?);
        }

        info!("Migration finished: {} steps", report.actions.len());
        Ok(report)
    }

    /// Deletes the unit owning an obsolete shape, if it still holds one.
    async fn remove_shape(&self, shape: &ObsoleteShape) -> Result<MigrationAction> {
        let unit = self.config.unit_full_name(&shape.unit);
        let project = self.config.project.name.as_str();

        let records = ResourceWalker::new(self.clients.engine.as_ref(), project)
            .walk(&unit)
            .await?;
        let found = records
            .iter()
            .any(|r| r.logical_id == shape.logical_id && r.type_tag == shape.resource_type);

        if !found {
            debug!("Unit {unit} holds no {} {}", shape.resource_type, shape.logical_id);
            return Ok(MigrationAction::ShapeAbsent {
                unit,
                logical_id: shape.logical_id.clone(),
            });
        }

        warn!(
            "Unit {unit} still holds obsolete {} {}; deleting the whole unit",
            shape.resource_type, shape.logical_id
        );

        ChangeExecutor::new(self.clients, project, self.config.poll_settings())
            .delete_unit(&unit)
            .await
            .map_err(|e| MigrationError::RemovalFailed {
                unit: unit.clone(),
                logical_id: shape.logical_id.clone(),
                resource_type: shape.resource_type.clone(),
                reason: e.to_string(),
            })?;

        Ok(MigrationAction::UnitRemoved {
            unit,
            logical_id: shape.logical_id.clone(),
            resource_type: shape.resource_type.clone(),
        })
    }

    /// Removes a multi-region table: replicas first, then the definition.
    async fn remove_table(&self, name: &str) -> Result<MigrationAction> {
        let tables = self.clients.tables.as_ref();
        let clock = self.clients.clock.as_ref();
        let settings = self.config.poll_settings();

        let Some(table) = tables.describe_table(name).await? else {
            debug!("Table {name} already removed");
            return Ok(MigrationAction::TableAbsent {
                table: name.to_string(),
            });
        };

        let mut replicas = Vec::new();
        for replica in &table.replicas {
            if replica.status == "DELETING" {
                replicas.push(replica.region.clone());
                continue;
            }
            info!("Removing replica of {name} in {}", replica.region);
            tolerate_missing(tables.remove_replica(name, &replica.region).await)?;
            replicas.push(replica.region.clone());
        }

        let what = format!("replica removal of table {name}");
        let exists = poll_until(clock, settings, &what, || async move {
            Ok(match tables.describe_table(name).await? {
                None => Probe::Done(false),
                Some(t) if t.replicas.is_empty() => Probe::Done(true),
                Some(t) => Probe::Pending(format!("{} replicas left", t.replicas.len())),
            })
        })
        .await?;

        if exists {
            info!("Deleting table definition {name}");
            tolerate_missing(tables.delete_table(name).await)?;

            let what = format!("deletion of table {name}");
            poll_until(clock, settings, &what, || async move {
                Ok(match tables.describe_table(name).await? {
                    None => Probe::Done(()),
                    Some(t) => Probe::Pending(t.status),
                })
            })
            .await?;
        }

        info!("Table {name} removed");
        Ok(MigrationAction::TableRemoved {
            table: name.to_string(),
            replicas,
        })
    }
}

/// Treats a not-found error as success.
fn tolerate_missing(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!("Already removed: {e}");
            Ok(())
        }
        other => other,
    }
}
