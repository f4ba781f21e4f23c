//! Planning module for deployment operations.
//!
//! This module decides what change each unit needs, applies ready changes,
//! and orders units into waves that respect declared dependencies.

mod change;
mod executor;
mod schedule;

pub use change::{
    change_name, is_no_change_reason, ChangePlanner, ChangeStatus, DesiredUnit, PlanOutcome,
    ReadyChange, CHANGE_NAME_PREFIX,
};
pub use executor::ChangeExecutor;
pub use schedule::{deploy_waves, run_bounded, teardown_waves};
