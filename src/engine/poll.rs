//! Fixed-interval polling with a hard wall-clock timeout.
//!
//! Every wait in the crate goes through [`poll_until`], so suspension only
//! happens at its sleep point and no wait can outlive its timeout.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DeployError, Result};

use super::clock::Clock;

/// Default polling interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default overall timeout in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 3600;

/// Interval and timeout for one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay between probes.
    pub interval: Duration,
    /// Hard limit on the whole wait.
    pub timeout: Duration,
}

impl PollSettings {
    /// Creates poll settings from seconds.
    #[must_use]
    pub const fn from_secs(interval_secs: u64, timeout_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_secs(DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS)
    }
}

/// Outcome of one probe.
#[derive(Debug)]
pub enum Probe<T> {
    /// Terminal state reached.
    Done(T),
    /// Still converging; carries a label of the observed state.
    Pending(String),
}

/// Probes until `Done`, an error, or the timeout.
///
/// Logs the observed state only when it changes between probes.
///
/// # Errors
///
/// Returns the probe's error, or [`DeployError::Timeout`] once the timeout
/// elapses. A timeout only stops this wait, not the remote operation.
pub async fn poll_until<T, F, Fut>(
    clock: &dyn Clock,
    settings: PollSettings,
    what: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
{
    let started = clock.elapsed();
    let mut last_state: Option<String> = None;

    loop {
        match probe().await? {
            Probe::Done(value) => return Ok(value),
            Probe::Pending(state) => {
                if last_state.as_deref() == Some(state.as_str()) {
                    debug!("{what}: still {state}");
                } else {
                    info!("{what}: {state}");
                    last_state = Some(state);
                }
            }
        }

        let elapsed = clock.elapsed().saturating_sub(started);
        if elapsed >= settings.timeout {
            return Err(DeployError::Timeout {
                what: what.to_string(),
                elapsed,
            }
            .into());
        }

        clock.sleep(settings.interval).await;
    }
}
