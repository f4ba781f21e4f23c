//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::engine::{UnitDescription, UnitStatus};
use crate::migration::MigrationReport;
use crate::reconciler::{DeployReport, UnitAction};
use crate::teardown::TeardownReport;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Live status of one unit, for table display.
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct UnitStatusRow {
    /// Unit name within the project.
    #[tabled(rename = "Unit")]
    pub unit: String,
    /// Engine status, or `absent`.
    #[tabled(rename = "Status")]
    pub status: String,
    /// Outputs as `key=value` pairs.
    #[tabled(rename = "Outputs")]
    pub outputs: String,
    /// Status reason.
    #[tabled(rename = "Reason")]
    pub reason: String,
}

impl UnitStatusRow {
    /// Builds a row from a unit's live description.
    #[must_use]
    pub fn new(unit: &str, live: Option<&UnitDescription>) -> Self {
        let Some(live) = live else {
            return Self {
                unit: unit.to_string(),
                status: String::from("absent"),
                outputs: String::new(),
                reason: String::new(),
            };
        };

        let mut outputs: Vec<String> = live.outputs.iter().map(|(k, v)| format!("{k}={v}")).collect();
        outputs.sort();

        Self {
            unit: unit.to_string(),
            status: live.status.to_string(),
            outputs: outputs.join(", "),
            reason: live.status_reason.clone().unwrap_or_default(),
        }
    }
}

/// Deploy result row for table display.
#[derive(Tabled)]
struct DeployRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Outputs")]
    outputs: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a deploy report.
    #[must_use]
    pub fn format_deploy(&self, report: &DeployReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_deploy_text(report),
        }
    }

    fn format_deploy_text(report: &DeployReport) -> String {
        let mut output = String::new();

        if !report.migration.is_noop() {
            let _ = writeln!(output, "{}", report.migration);
        }

        let status = if report.is_success() {
            format!("{} Deploy complete", "✓".green())
        } else {
            format!("{} Deploy incomplete", "✗".red())
        };
        let _ = write!(output, "{status}\n\n");

        let rows: Vec<DeployRow> = report
            .units
            .iter()
            .map(|u| DeployRow {
                unit: u.unit.clone(),
                action: Self::format_action(u.action),
                outputs: u.outputs.len(),
            })
            .collect();
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let failures: Vec<_> = report.units.iter().filter(|u| u.error.is_some()).collect();
        if !failures.is_empty() {
            let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
            for unit in failures {
                let _ = writeln!(
                    output,
                    "   - {}: {}",
                    unit.unit,
                    unit.error.as_deref().unwrap_or_default()
                );
            }
        }

        output
    }

    /// Formats the live status of every unit.
    #[must_use]
    pub fn format_status(&self, project: &str, rows: &[UnitStatusRow]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(rows).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("\nProject: {project}\n\n");
                if rows.is_empty() {
                    output.push_str("   No units configured.\n");
                    return output;
                }

                let colored_rows: Vec<UnitStatusRow> = rows
                    .iter()
                    .map(|r| UnitStatusRow {
                        status: Self::format_unit_status(&r.status),
                        ..r.clone()
                    })
                    .collect();
                output.push_str(&Table::new(colored_rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats a teardown report.
    #[must_use]
    pub fn format_teardown(&self, report: &TeardownReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if report.failures.is_empty() {
                    format!("{} Teardown complete\n\n", "✓".green())
                } else {
                    format!("{} Teardown incomplete\n\n", "✗".red())
                };

                for unit in &report.deleted {
                    let _ = writeln!(output, "   {} {unit}", "-deleted".red());
                }
                for unit in &report.absent {
                    let _ = writeln!(output, "   {} {unit}", "absent".dimmed());
                }
                for action in &report.pre_clean {
                    let _ = writeln!(output, "   {} {action}", "pre-clean".yellow());
                }
                for bucket in &report.swept {
                    let _ = writeln!(output, "   {} {bucket}", "swept".yellow());
                }

                if !report.failures.is_empty() {
                    let _ = write!(output, "\n{} Failures:\n", "⚠".yellow());
                    for failure in &report.failures {
                        let _ = writeln!(
                            output,
                            "   - [{}] {}: {}",
                            failure.stage, failure.target, failure.error
                        );
                        for diagnostic in &failure.diagnostics {
                            let _ = writeln!(output, "       {diagnostic}");
                        }
                    }
                }

                output
            }
        }
    }

    /// Formats a migration report.
    #[must_use]
    pub fn format_migration(&self, report: &MigrationReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_noop() {
                    format!("{} Nothing to migrate\n", "✓".green())
                } else {
                    format!("{} {report}", "✓".green())
                }
            }
        }
    }

    /// Formats an action with color.
    fn format_action(action: UnitAction) -> String {
        match action {
            UnitAction::Created => "+created".green().to_string(),
            UnitAction::Updated => "~updated".yellow().to_string(),
            UnitAction::Unchanged => "unchanged".dimmed().to_string(),
            UnitAction::Failed => "failed".red().to_string(),
            UnitAction::Skipped => "skipped".red().to_string(),
        }
    }

    /// Formats a unit status string with color.
    fn format_unit_status(status: &str) -> String {
        let parsed = UnitStatus::parse(status);
        if parsed.is_success() {
            status.green().to_string()
        } else if parsed.is_in_progress() {
            status.yellow().to_string()
        } else if status == "absent" {
            status.dimmed().to_string()
        } else {
            status.red().to_string()
        }
    }
}
