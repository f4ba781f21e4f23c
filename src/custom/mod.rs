//! Custom resource dispatcher.
//!
//! The engine calls back into this crate for resource types it cannot
//! manage itself. This module owns the wire envelope, the registry that
//! routes a type tag to its handler, the shared property decoding, and the
//! built-in handlers.

mod alarms;
mod decode;
mod envelope;
mod lifecycle;
mod registry;

pub use alarms::{AlarmSetId, AlarmSpec, AlarmsHandler, AlarmsProperties, ALARMS_TYPE};
pub use decode::{decode_properties, f64_lenient, option_u32_lenient, u32_lenient};
pub use envelope::{
    failed_physical_id, HandlerOutput, InvocationRequest, InvocationResponse, RequestKind,
    ResponseStatus, FAILED_ID_PREFIX,
};
pub use lifecycle::{LifecycleHandler, LifecycleProperties, LIFECYCLE_TYPE};
pub use registry::{CustomResource, HandlerRegistry, RegistryBuilder};

use crate::clients::Clients;
use crate::error::Result;

/// Builds the registry of built-in handlers.
///
/// # Errors
///
/// Returns an error if two handlers claim the same type tag.
pub fn builtin_registry(clients: &Clients) -> Result<HandlerRegistry> {
    HandlerRegistry::builder()
        .register(AlarmsHandler::new(clients.alarms.clone()))
        .register(LifecycleHandler::new(clients.object_store.clone()))
        .build()
}
