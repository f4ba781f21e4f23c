//! Declarative engine integration.
//!
//! This module defines the engine seam, the side-channel service seams,
//! the HTTP client implementing them, and the clock and poll loop every
//! wait in the crate goes through.

mod api;
mod client;
mod clock;
mod poll;
mod services;
mod types;

pub use api::DeclarativeEngine;
pub use client::EngineClient;
#[cfg(test)]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use poll::{poll_until, PollSettings, Probe, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS};
#[cfg(test)]
pub use services::MockAlarmService;
pub use services::{
    AlarmDefinition, AlarmService, Comparison, ContainerRegistry, MultiRegionTables,
    ReplicaStatus, TableDescription,
};
pub use types::{
    ChangeKind, ChangeRequest, NewChangeRequest, RawChangeStatus, ResourceRecord,
    ResourceStatus, UnitDescription, UnitStatus, BUCKET_TYPE, NESTED_UNIT_TYPE, REPOSITORY_TYPE,
};
