//! CLI module for the fleetform deployment tool.
//!
//! This module provides the command-line interface for deploying, tearing
//! down and migrating a fleet, and for serving custom resource callbacks.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::{OutputFormatter, UnitStatusRow};
