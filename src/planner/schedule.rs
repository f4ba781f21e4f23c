//! Unit ordering and the bounded worker pool.
//!
//! Units only wait for each other when `depends_on` says so. Units are
//! grouped into waves: every unit in a wave depends only on units in
//! earlier waves, so a wave can run in parallel. Teardown walks the same
//! waves in reverse.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::UnitConfig;
use crate::error::{ConfigError, FleetError, Result};

/// Groups units into deploy waves, dependencies first.
///
/// Units keep their declaration order within a wave.
///
/// # Errors
///
/// Returns an error if a dependency is unknown or the dependencies form a cycle.
pub fn deploy_waves(units: &[UnitConfig]) -> Result<Vec<Vec<String>>> {
    let names: HashSet<&str> = units.iter().map(|u| u.name.as_str()).collect();

    for unit in units {
        if let Some(missing) = unit.depends_on.iter().find(|d| !names.contains(d.as_str())) {
            return Err(FleetError::Config(ConfigError::validation(
                format!("Unit '{}' depends on unknown unit '{missing}'", unit.name),
                "units",
            )));
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut waves = Vec::new();

    while placed.len() < units.len() {
        let wave: Vec<&str> = units
            .iter()
            .filter(|u| !placed.contains(u.name.as_str()))
            .filter(|u| u.depends_on.iter().all(|d| placed.contains(d.as_str())))
            .map(|u| u.name.as_str())
            .collect();

        if wave.is_empty() {
            let remaining: Vec<&UnitConfig> = units
                .iter()
                .filter(|u| !placed.contains(u.name.as_str()))
                .collect();
            return Err(FleetError::Config(ConfigError::CircularDependency {
                cycle: describe_cycle(&remaining),
            }));
        }

        placed.extend(wave.iter().copied());
        waves.push(wave.into_iter().map(String::from).collect());
    }

    debug!("Scheduled {} units in {} waves", units.len(), waves.len());
    Ok(waves)
}

/// Groups units into teardown waves: dependents before their dependencies.
///
/// # Errors
///
/// Returns an error if a dependency is unknown or the dependencies form a cycle.
pub fn teardown_waves(units: &[UnitConfig]) -> Result<Vec<Vec<String>>> {
    let mut waves = deploy_waves(units)?;
    waves.reverse();
    Ok(waves)
}

/// Follows dependencies among unplaceable units until one repeats.
fn describe_cycle(remaining: &[&UnitConfig]) -> String {
    let by_name: HashMap<&str, &UnitConfig> =
        remaining.iter().map(|u| (u.name.as_str(), *u)).collect();

    let Some(start) = remaining.first() else {
        return String::new();
    };

    let mut path: Vec<&str> = vec![start.name.as_str()];
    let mut current = *start;

    loop {
        let Some(next) = current
            .depends_on
            .iter()
            .find_map(|d| by_name.get(d.as_str()).copied())
        else {
            return path.join(" -> ");
        };

        if let Some(pos) = path.iter().position(|n| *n == next.name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(next.name.as_str());
            return cycle.join(" -> ");
        }

        path.push(next.name.as_str());
        current = next;
    }
}

/// Runs one task per item on a pool of `min(items, max_parallel)` workers.
///
/// Every task runs to completion even when others fail. Results come back
/// in item order.
pub async fn run_bounded<T, F, Fut>(
    items: Vec<String>,
    max_parallel: usize,
    task: F,
) -> Vec<(String, Result<T>)>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let workers = items.len().min(max_parallel).max(1);
    debug!("Running {} tasks on {workers} workers", items.len());

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut set = JoinSet::new();

    for (index, item) in items.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let future = task(item.clone());
        set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => future.await,
                Err(e) => Err(FleetError::internal(format!("worker pool closed: {e}"))),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<Result<T>>> = items.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => debug!("Worker task ended abnormally: {e}"),
        }
    }

    items
        .into_iter()
        .zip(slots)
        .map(|(item, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(FleetError::internal(format!("task for '{item}' did not complete")))
            });
            (item, result)
        })
        .collect()
}
