//! In-memory fakes of every remote seam, shared by the unit tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clients::Clients;
use crate::config::{
    ConcurrencyConfig, CustomResourcesConfig, EngineConfig, FleetConfig, MigrationsConfig,
    PollingConfig, ProjectConfig, TeardownConfig, UnitConfig, TAG_PROJECT,
};
use crate::engine::{
    ChangeKind, ChangeRequest, ContainerRegistry, DeclarativeEngine, ManualClock,
    MockAlarmService, MultiRegionTables, NewChangeRequest, RawChangeStatus, ReplicaStatus,
    ResourceRecord, ResourceStatus, TableDescription, UnitDescription, UnitStatus,
    NESTED_UNIT_TYPE,
};
use crate::error::{EngineError, Result, StoreError};
use crate::store::{
    LifecycleRule, ObjectStore, ObjectVersion, PageToken, TaggedBucket, VersionPage,
    LIST_PAGE_SIZE,
};

/// Builds a config with one unit per name, project `shop`, environment `dev`.
pub fn test_config(units: &[&str]) -> FleetConfig {
    FleetConfig {
        project: ProjectConfig {
            name: String::from("shop"),
            environment: String::from("dev"),
        },
        engine: EngineConfig {
            endpoint: String::from("https://engine.example"),
            token_env: String::from("FLEETFORM_ENGINE_TOKEN"),
            region: None,
            staging_location: None,
        },
        polling: PollingConfig {
            interval_secs: 1,
            timeout_secs: 60,
            max_attempts: 3,
        },
        concurrency: ConcurrencyConfig {
            max_parallel_units: 4,
        },
        teardown: TeardownConfig {
            direct_delete_limit: 10_000,
            expiration_days: 1,
        },
        units: units
            .iter()
            .map(|name| UnitConfig {
                name: (*name).to_string(),
                template: format!("{name}.yaml"),
                parameters: HashMap::from([(String::from("Size"), String::from("1"))]),
                tags: HashMap::new(),
                depends_on: Vec::new(),
            })
            .collect(),
        custom_resources: CustomResourcesConfig::default(),
        migrations: MigrationsConfig::default(),
    }
}

/// Client bundle over a fake engine, an empty object store and a manual clock.
pub fn fake_clients(engine: FakeEngine) -> (Clients, Arc<ManualClock>) {
    fake_clients_with_store(engine, FakeObjectStore::new())
}

/// Client bundle over the given fakes and a manual clock.
pub fn fake_clients_with_store(
    engine: FakeEngine,
    store: FakeObjectStore,
) -> (Clients, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let engine = Arc::new(engine);
    let clients = Clients {
        engine: engine.clone(),
        object_store: Arc::new(store),
        registry: engine.clone(),
        alarms: Arc::new(MockAlarmService::new()),
        tables: engine,
        clock: clock.clone(),
    };
    (clients, clock)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("fake state lock")
}

fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
    items
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// An execute that has not finished yet.
#[derive(Debug, Clone)]
struct PendingApply {
    remaining: usize,
    kind: ChangeKind,
    parameters: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct UnitState {
    description: Option<UnitDescription>,
    resources: Vec<ResourceRecord>,
    pending_apply: Option<PendingApply>,
}

#[derive(Debug)]
struct StoredChange {
    request: ChangeRequest,
    remaining: usize,
    final_status: RawChangeStatus,
    final_reason: Option<String>,
}

#[derive(Debug, Default)]
struct EngineState {
    units: BTreeMap<String, UnitState>,
    changes: Vec<StoredChange>,
    submitted: Vec<NewChangeRequest>,
    executions: usize,
    deleted_units: Vec<String>,
    evaluation_polls: usize,
    evaluation_failure: Option<String>,
    apply_polls: usize,
    apply_outputs: HashMap<String, String>,
    apply_failure: Option<(String, Vec<(String, String, String)>)>,
    delete_failures: HashMap<String, Vec<(String, String)>>,
    expire_after_execute: bool,
    credentials_expired: bool,
    repositories_deleted: Vec<String>,
    tables: BTreeMap<String, TableDescription>,
    replica_removals: Vec<(String, String)>,
    table_deletions: Vec<String>,
    next_id: usize,
}

/// In-memory declarative engine; also fakes the registry and table seams.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a live unit owned by `owner`.
    pub fn add_unit(&self, name: &str, owner: &str, status: UnitStatus) {
        let mut state = lock(&self.state);
        let unit = state.units.entry(name.to_string()).or_default();
        unit.description = Some(UnitDescription {
            name: name.to_string(),
            status,
            status_reason: None,
            outputs: HashMap::new(),
            parameters: HashMap::new(),
            tags: HashMap::from([(TAG_PROJECT.to_string(), owner.to_string())]),
            created_at: None,
        });
    }

    /// Adds a resource record to a unit.
    pub fn add_resource(
        &self,
        unit: &str,
        logical_id: &str,
        type_tag: &str,
        status: &str,
        reason: Option<&str>,
    ) {
        let mut state = lock(&self.state);
        state
            .units
            .entry(unit.to_string())
            .or_default()
            .resources
            .push(ResourceRecord {
                logical_id: logical_id.to_string(),
                physical_id: None,
                type_tag: type_tag.to_string(),
                status: ResourceStatus::new(status),
                status_reason: reason.map(String::from),
                unit: unit.to_string(),
            });
    }

    /// Adds a nested unit record pointing at `child`.
    pub fn add_nested(&self, unit: &str, logical_id: &str, child: &str) {
        self.add_resource(unit, logical_id, NESTED_UNIT_TYPE, "CREATE_COMPLETE", None);
        self.set_physical_id(unit, logical_id, child);
    }

    pub fn set_physical_id(&self, unit: &str, logical_id: &str, physical_id: &str) {
        let mut state = lock(&self.state);
        if let Some(record) = state
            .units
            .get_mut(unit)
            .and_then(|u| u.resources.iter_mut().find(|r| r.logical_id == logical_id))
        {
            record.physical_id = Some(physical_id.to_string());
        }
    }

    pub fn set_outputs(&self, unit: &str, outputs: &[(&str, &str)]) {
        self.with_description(unit, |d| d.outputs = pairs(outputs));
    }

    pub fn set_live_parameters(&self, unit: &str, parameters: &HashMap<String, String>) {
        self.with_description(unit, |d| d.parameters = parameters.clone());
    }

    /// Number of describes a change request stays in evaluation.
    pub fn set_evaluation_polls(&self, polls: usize) {
        lock(&self.state).evaluation_polls = polls;
    }

    /// Makes every evaluation fail with `reason`.
    pub fn fail_evaluation(&self, reason: &str) {
        lock(&self.state).evaluation_failure = Some(reason.to_string());
    }

    /// Number of describes a unit stays in progress after execute.
    pub fn set_apply_polls(&self, polls: usize) {
        lock(&self.state).apply_polls = polls;
    }

    /// Outputs a successful apply publishes.
    pub fn set_apply_outputs(&self, outputs: &[(&str, &str)]) {
        lock(&self.state).apply_outputs = pairs(outputs);
    }

    /// Makes every apply end in `status` with the given failed resources.
    pub fn fail_apply(&self, status: &str, resources: &[(&str, &str, &str)]) {
        let resources = resources
            .iter()
            .map(|(l, s, r)| ((*l).to_string(), (*s).to_string(), (*r).to_string()))
            .collect();
        lock(&self.state).apply_failure = Some((status.to_string(), resources));
    }

    /// Makes deletion of `unit` fail, marking the given resources.
    pub fn fail_delete(&self, unit: &str, resources: &[(&str, &str)]) {
        let resources = resources
            .iter()
            .map(|(l, r)| ((*l).to_string(), (*r).to_string()))
            .collect();
        lock(&self.state)
            .delete_failures
            .insert(unit.to_string(), resources);
    }

    /// Every call after the next execute fails with expired credentials.
    pub fn expire_credentials_after_execute(&self) {
        lock(&self.state).expire_after_execute = true;
    }

    /// Starts an update on `unit` as if another operator had executed one.
    pub fn begin_apply(&self, unit: &str) {
        let mut state = lock(&self.state);
        let remaining = state.apply_polls;
        if let Some(live) = state.units.get_mut(unit) {
            let parameters = live
                .description
                .as_ref()
                .map(|d| d.parameters.clone())
                .unwrap_or_default();
            if let Some(description) = live.description.as_mut() {
                description.status = UnitStatus::UpdateInProgress;
            }
            live.pending_apply = Some(PendingApply {
                remaining,
                kind: ChangeKind::Update,
                parameters,
            });
        }
    }

    /// Adds a multi-region table with replicas in `regions`.
    pub fn add_table(&self, name: &str, regions: &[&str]) {
        lock(&self.state).tables.insert(
            name.to_string(),
            TableDescription {
                name: name.to_string(),
                status: String::from("ACTIVE"),
                replicas: regions
                    .iter()
                    .map(|r| ReplicaStatus {
                        region: (*r).to_string(),
                        status: String::from("ACTIVE"),
                    })
                    .collect(),
            },
        );
    }

    pub fn has_table(&self, name: &str) -> bool {
        lock(&self.state).tables.contains_key(name)
    }

    pub fn has_unit(&self, name: &str) -> bool {
        lock(&self.state)
            .units
            .get(name)
            .is_some_and(|u| u.description.is_some())
    }

    pub fn replica_removals(&self) -> Vec<(String, String)> {
        lock(&self.state).replica_removals.clone()
    }

    pub fn table_deletions(&self) -> Vec<String> {
        lock(&self.state).table_deletions.clone()
    }

    pub fn submitted(&self) -> Vec<NewChangeRequest> {
        lock(&self.state).submitted.clone()
    }

    pub fn executions(&self) -> usize {
        lock(&self.state).executions
    }

    /// Units whose deletion completed, in order.
    pub fn deleted_units(&self) -> Vec<String> {
        lock(&self.state).deleted_units.clone()
    }

    pub fn repositories_deleted(&self) -> Vec<String> {
        lock(&self.state).repositories_deleted.clone()
    }

    /// Change requests still attached to a unit.
    pub fn change_requests(&self, unit: &str) -> Vec<ChangeRequest> {
        lock(&self.state)
            .changes
            .iter()
            .filter(|c| c.request.unit == unit)
            .map(|c| c.request.clone())
            .collect()
    }

    fn with_description(&self, unit: &str, f: impl FnOnce(&mut UnitDescription)) {
        let mut state = lock(&self.state);
        if let Some(description) = state
            .units
            .get_mut(unit)
            .and_then(|u| u.description.as_mut())
        {
            f(description);
        }
    }

    fn check_credentials(state: &EngineState) -> Result<()> {
        if state.credentials_expired {
            return Err(EngineError::CredentialsExpired {
                message: String::from("ExpiredToken"),
            }
            .into());
        }
        Ok(())
    }
}

/// Moves a unit one step through its pending apply.
fn advance_apply(
    unit: &mut UnitState,
    outputs: &HashMap<String, String>,
    failure: Option<&(String, Vec<(String, String, String)>)>,
) {
    let Some(pending) = unit.pending_apply.as_mut() else {
        return;
    };
    if pending.remaining > 0 {
        pending.remaining -= 1;
        return;
    }

    let Some(pending) = unit.pending_apply.take() else {
        return;
    };
    let name = unit
        .description
        .as_ref()
        .map(|d| d.name.clone())
        .unwrap_or_default();

    if let Some((status, resources)) = failure {
        for (logical_id, resource_status, reason) in resources {
            unit.resources.push(ResourceRecord {
                logical_id: logical_id.clone(),
                physical_id: None,
                type_tag: String::from("AWS::SQS::Queue"),
                status: ResourceStatus::new(resource_status.as_str()),
                status_reason: Some(reason.clone()),
                unit: name.clone(),
            });
        }
        if let Some(description) = unit.description.as_mut() {
            description.status = UnitStatus::parse(status);
            description.status_reason = Some(String::from("Resources failed"));
        }
        return;
    }

    if let Some(description) = unit.description.as_mut() {
        description.status = match pending.kind {
            ChangeKind::Create => UnitStatus::CreateComplete,
            ChangeKind::Update => UnitStatus::UpdateComplete,
        };
        description.parameters = pending.parameters;
        description.outputs.extend(outputs.clone());
    }
}

#[async_trait]
impl DeclarativeEngine for FakeEngine {
    async fn describe_unit(&self, unit: &str) -> Result<Option<UnitDescription>> {
        let mut state = lock(&self.state);
        Self::check_credentials(&state)?;

        let outputs = state.apply_outputs.clone();
        let failure = state.apply_failure.clone();
        let Some(live) = state.units.get_mut(unit) else {
            return Ok(None);
        };
        advance_apply(live, &outputs, failure.as_ref());
        Ok(live.description.clone())
    }

    async fn list_change_requests(&self, unit: &str) -> Result<Vec<ChangeRequest>> {
        let state = lock(&self.state);
        Self::check_credentials(&state)?;
        Ok(state
            .changes
            .iter()
            .filter(|c| c.request.unit == unit)
            .map(|c| c.request.clone())
            .collect())
    }

    async fn create_change_request(&self, request: &NewChangeRequest) -> Result<String> {
        let mut state = lock(&self.state);
        Self::check_credentials(&state)?;

        state.next_id += 1;
        let id = format!("change-{}", state.next_id);
        state.submitted.push(request.clone());

        let live_parameters = state
            .units
            .get(&request.unit)
            .and_then(|u| u.description.as_ref())
            .filter(|d| !d.status.is_deleted())
            .map(|d| d.parameters.clone());

        if request.kind == ChangeKind::Create && live_parameters.is_none() {
            let unit = state.units.entry(request.unit.clone()).or_default();
            unit.resources.clear();
            unit.description = Some(UnitDescription {
                name: request.unit.clone(),
                status: UnitStatus::ReviewInProgress,
                status_reason: None,
                outputs: HashMap::new(),
                parameters: HashMap::new(),
                tags: request.tags.clone(),
                created_at: None,
            });
        }

        let (final_status, final_reason) = if let Some(reason) = &state.evaluation_failure {
            (RawChangeStatus::Failed, Some(reason.clone()))
        } else if request.kind == ChangeKind::Update
            && live_parameters.as_ref() == Some(&request.parameters)
        {
            (
                RawChangeStatus::Failed,
                Some(String::from("No updates are to be performed.")),
            )
        } else {
            (RawChangeStatus::CreateComplete, None)
        };

        let remaining = state.evaluation_polls;
        state.changes.push(StoredChange {
            request: ChangeRequest {
                id: id.clone(),
                name: request.name.clone(),
                unit: request.unit.clone(),
                kind: request.kind,
                parameters: request.parameters.clone(),
                status: RawChangeStatus::CreatePending,
                status_reason: None,
                description: Some(request.description.clone()),
                executing: false,
            },
            remaining,
            final_status,
            final_reason,
        });

        Ok(id)
    }

    async fn describe_change_request(&self, unit: &str, change_id: &str) -> Result<ChangeRequest> {
        let mut state = lock(&self.state);
        Self::check_credentials(&state)?;

        let change = state
            .changes
            .iter_mut()
            .find(|c| c.request.unit == unit && c.request.id == change_id)
            .ok_or_else(|| EngineError::not_found("change request", change_id))?;

        if change.remaining > 0 {
            change.remaining -= 1;
            change.request.status = RawChangeStatus::CreateInProgress;
        } else {
            change.request.status = change.final_status;
            change.request.status_reason = change.final_reason.clone();
        }
        Ok(change.request.clone())
    }

    async fn execute_change_request(&self, unit: &str, change_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        Self::check_credentials(&state)?;

        let position = state
            .changes
            .iter()
            .position(|c| c.request.unit == unit && c.request.id == change_id)
            .ok_or_else(|| EngineError::not_found("change request", change_id))?;
        let change = state.changes.remove(position);

        state.executions += 1;
        if state.expire_after_execute {
            state.credentials_expired = true;
        }

        let remaining = state.apply_polls;
        let live = state
            .units
            .get_mut(unit)
            .ok_or_else(|| EngineError::not_found("unit", unit))?;
        if let Some(description) = live.description.as_mut() {
            description.status = match change.request.kind {
                ChangeKind::Create => UnitStatus::CreateInProgress,
                ChangeKind::Update => UnitStatus::UpdateInProgress,
            };
        }
        live.pending_apply = Some(PendingApply {
            remaining,
            kind: change.request.kind,
            parameters: change.request.parameters,
        });
        Ok(())
    }

    async fn delete_change_request(&self, unit: &str, change_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state
            .changes
            .retain(|c| !(c.request.unit == unit && c.request.id == change_id));
        Ok(())
    }

    async fn list_unit_resources(&self, unit: &str) -> Result<Vec<ResourceRecord>> {
        let state = lock(&self.state);
        Self::check_credentials(&state)?;
        state
            .units
            .get(unit)
            .filter(|u| u.description.is_some())
            .map(|u| u.resources.clone())
            .ok_or_else(|| EngineError::not_found("unit", unit).into())
    }

    async fn delete_unit(&self, unit: &str) -> Result<()> {
        let mut state = lock(&self.state);
        Self::check_credentials(&state)?;

        if let Some(failures) = state.delete_failures.get(unit).cloned() {
            if let Some(live) = state.units.get_mut(unit) {
                for (logical_id, reason) in failures {
                    if let Some(record) = live.resources.iter_mut().find(|r| r.logical_id == logical_id) {
                        record.status = ResourceStatus::new("DELETE_FAILED");
                        record.status_reason = Some(reason);
                    }
                }
                if let Some(description) = live.description.as_mut() {
                    description.status = UnitStatus::DeleteFailed;
                    description.status_reason =
                        Some(String::from("The following resource(s) failed to delete"));
                }
            }
            return Ok(());
        }

        state.units.remove(unit);
        state.changes.retain(|c| c.request.unit != unit);
        state.deleted_units.push(unit.to_string());
        Ok(())
    }
}

#[async_trait]
impl ContainerRegistry for FakeEngine {
    async fn force_delete_repository(&self, name: &str) -> Result<()> {
        lock(&self.state).repositories_deleted.push(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl MultiRegionTables for FakeEngine {
    async fn describe_table(&self, name: &str) -> Result<Option<TableDescription>> {
        let mut state = lock(&self.state);
        let Some(table) = state.tables.get_mut(name) else {
            return Ok(None);
        };
        let snapshot = table.clone();

        // Transitional states last for exactly one describe.
        table.replicas.retain(|r| r.status != "DELETING");
        if table.status == "DELETING" {
            state.tables.remove(name);
        }
        Ok(Some(snapshot))
    }

    async fn remove_replica(&self, name: &str, region: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| EngineError::not_found("table", name))?;
        let replica = table
            .replicas
            .iter_mut()
            .find(|r| r.region == region)
            .ok_or_else(|| EngineError::not_found("replica", region))?;
        replica.status = String::from("DELETING");
        state
            .replica_removals
            .push((name.to_string(), region.to_string()));
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let table = state
            .tables
            .get_mut(name)
            .ok_or_else(|| EngineError::not_found("table", name))?;
        table.status = String::from("DELETING");
        state.table_deletions.push(name.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FakeBucket {
    tags: HashMap<String, String>,
    versions: Vec<ObjectVersion>,
    rules: Vec<LifecycleRule>,
}

#[derive(Debug, Default)]
struct StoreState {
    buckets: BTreeMap<String, FakeBucket>,
    list_calls: usize,
    delete_calls: usize,
}

/// In-memory object store.
#[derive(Debug, Clone, Default)]
pub struct FakeObjectStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bucket holding `versions` object versions.
    pub fn add_bucket(&self, name: &str, tags: &[(&str, &str)], versions: usize) {
        let versions = (0..versions)
            .map(|i| ObjectVersion {
                key: format!("object-{i:06}"),
                version_id: Some(format!("v{i}")),
            })
            .collect();
        lock(&self.state).buckets.insert(
            name.to_string(),
            FakeBucket {
                tags: pairs(tags),
                versions,
                rules: Vec::new(),
            },
        );
    }

    pub fn has_bucket(&self, name: &str) -> bool {
        lock(&self.state).buckets.contains_key(name)
    }

    pub fn version_count(&self, bucket: &str) -> usize {
        lock(&self.state)
            .buckets
            .get(bucket)
            .map_or(0, |b| b.versions.len())
    }

    pub fn lifecycle_rules(&self, bucket: &str) -> Vec<LifecycleRule> {
        lock(&self.state)
            .buckets
            .get(bucket)
            .map(|b| b.rules.clone())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        lock(&self.state).list_calls
    }

    pub fn delete_calls(&self) -> usize {
        lock(&self.state).delete_calls
    }
}

fn missing_bucket(bucket: &str) -> StoreError {
    StoreError::BucketNotFound {
        bucket: bucket.to_string(),
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn list_object_versions(
        &self,
        bucket: &str,
        token: Option<&PageToken>,
    ) -> Result<VersionPage> {
        let mut state = lock(&self.state);
        state.list_calls += 1;
        let stored = state.buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;

        let start = token
            .and_then(|t| t.key_marker.as_deref())
            .and_then(|k| k.parse::<usize>().ok())
            .unwrap_or(0);
        let end = (start + LIST_PAGE_SIZE).min(stored.versions.len());
        let next = (end < stored.versions.len()).then(|| PageToken {
            key_marker: Some(end.to_string()),
            version_id_marker: None,
        });

        Ok(VersionPage {
            versions: stored.versions[start..end].to_vec(),
            next,
        })
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectVersion]) -> Result<usize> {
        let mut state = lock(&self.state);
        state.delete_calls += 1;
        let stored = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;

        let doomed: HashSet<&ObjectVersion> = objects.iter().collect();
        let before = stored.versions.len();
        stored.versions.retain(|v| !doomed.contains(v));
        Ok(before - stored.versions.len())
    }

    async fn put_lifecycle_rule(&self, bucket: &str, rule: &LifecycleRule) -> Result<()> {
        let mut state = lock(&self.state);
        let stored = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;
        stored.rules.retain(|r| r.id != rule.id);
        stored.rules.push(rule.clone());
        Ok(())
    }

    async fn delete_lifecycle_rule(&self, bucket: &str, rule_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let stored = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;
        stored.rules.retain(|r| r.id != rule_id);
        Ok(())
    }

    async fn list_tagged_buckets(&self, key: &str, value: &str) -> Result<Vec<TaggedBucket>> {
        let state = lock(&self.state);
        Ok(state
            .buckets
            .iter()
            .filter(|(_, b)| b.tags.get(key).map(String::as_str) == Some(value))
            .map(|(name, b)| TaggedBucket {
                name: name.clone(),
                tags: b.tags.clone(),
            })
            .collect())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        lock(&self.state).buckets.remove(bucket);
        Ok(())
    }
}
