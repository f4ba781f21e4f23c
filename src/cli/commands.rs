//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fleetform - declarative deploy and teardown of deployment-unit fleets.
#[derive(Parser, Debug)]
#[command(name = "fleetform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "FLEETFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the fleet configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Run migrations, then deploy every unit.
    Deploy,

    /// Show the live status of every unit.
    Status,

    /// Delete every unit and clean up what the engine cannot.
    Teardown {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Run the configured migrations only.
    Migrate,

    /// Handle one custom resource invocation and print the response.
    Invoke {
        /// JSON request file; read from stdin when absent.
        #[arg(short, long)]
        request: Option<PathBuf>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
