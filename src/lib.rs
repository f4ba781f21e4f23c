// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![warn(unused_imports)]
#![warn(unused_variables)]
#![warn(dead_code)]

// Clippy lints (warnings only)
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Fleetform
//!
//! Declarative deploy and teardown of a fleet of deployment units managed by
//! a declarative infrastructure engine.
//!
//! ## Overview
//!
//! A fleet is a set of named units, each one a template plus parameters,
//! with dependencies between them. Fleetform:
//!
//! - Plans every change as a change request and only executes real changes
//! - Deploys units in dependency waves, bounded by a concurrency limit
//! - Runs pre-deploy migrations for resource shapes the engine cannot replace
//! - Tears the fleet down in reverse order, cleaning up what the engine cannot
//! - Serves the custom resource callbacks the deployed templates rely on
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`engine`]: Engine API seam, poll loop and clock
//! - [`store`]: Object-store side channel
//! - [`walker`]: Recursive nested-unit resource walker
//! - [`planner`]: Change planning, execution and dependency waves
//! - [`custom`]: Custom resource dispatcher and built-in handlers
//! - [`migration`]: Pre-deploy migrations
//! - [`reconciler`]: Fleet deploy orchestration
//! - [`teardown`]: Fleet teardown orchestration
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: shop
//!   environment: prod
//!
//! engine:
//!   endpoint: https://engine.example.com
//!   token_env: FLEETFORM_ENGINE_TOKEN
//!
//! units:
//!   - name: storage
//!     template: templates/storage.yaml
//!   - name: api
//!     template: templates/api.yaml
//!     depends_on: [storage]
//!     parameters:
//!       Size: "2"
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod clients;
pub mod config;
pub mod custom;
pub mod engine;
pub mod error;
pub mod migration;
pub mod planner;
pub mod reconciler;
pub mod store;
pub mod teardown;
pub mod walker;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use clients::Clients;
pub use config::{ConfigParser, ConfigValidator, FleetConfig};
pub use custom::{builtin_registry, HandlerRegistry, InvocationRequest, InvocationResponse};
pub use error::{FleetError, Result};
pub use migration::{MigrationEngine, MigrationReport};
pub use planner::{ChangeExecutor, ChangePlanner};
pub use reconciler::{DeployReport, Reconciler};
pub use teardown::{TeardownEngine, TeardownReport};
