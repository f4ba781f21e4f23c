//! The client bundle handed to every orchestrator.
//!
//! Clients are built once at startup and passed down explicitly; nothing in
//! the crate reaches for a global.

use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigParser, FleetConfig};
use crate::engine::{
    AlarmService, Clock, ContainerRegistry, DeclarativeEngine, EngineClient, MultiRegionTables,
    SystemClock,
};
use crate::error::Result;
use crate::store::{ObjectStore, S3ObjectStore};

/// Every remote seam plus the clock.
#[derive(Clone)]
pub struct Clients {
    /// Declarative engine.
    pub engine: Arc<dyn DeclarativeEngine>,
    /// Object store side channel.
    pub object_store: Arc<dyn ObjectStore>,
    /// Container image registry.
    pub registry: Arc<dyn ContainerRegistry>,
    /// Metric alarms.
    pub alarms: Arc<dyn AlarmService>,
    /// Multi-region tables.
    pub tables: Arc<dyn MultiRegionTables>,
    /// Clock used by every poll loop.
    pub clock: Arc<dyn Clock>,
}

impl Clients {
    /// Connects to the engine and the object store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine token is missing or the HTTP client
    /// cannot be built.
    pub async fn connect(config: &FleetConfig) -> Result<Self> {
        let token = ConfigParser::engine_token(config)?;
        let engine = Arc::new(EngineClient::new(&config.engine.endpoint, &token)?);
        let object_store = Arc::new(S3ObjectStore::new(config.engine.region.as_deref()).await);

        info!("Connected to engine at {}", config.engine.endpoint);

        Ok(Self {
            engine: engine.clone(),
            object_store,
            registry: engine.clone(),
            alarms: engine.clone(),
            tables: engine,
            clock: Arc::new(SystemClock::new()),
        })
    }
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}
