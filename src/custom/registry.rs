//! Handler registry and dispatcher.
//!
//! Handlers are registered by type tag when the process starts. The shared
//! layer decodes and validates properties, skips equivalent updates and
//! placeholder deletes, and only then calls the handler.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, info, warn};
use validator::Validate;

use crate::error::{ConfigError, FleetError, Result, ValidationError};

use super::decode::decode_properties;
use super::envelope::{
    failed_physical_id, HandlerOutput, InvocationRequest, InvocationResponse, RequestKind,
    FAILED_ID_PREFIX,
};

/// A custom resource type.
///
/// Invocations are delivered at least once, so every operation must be
/// safe to repeat. CREATE must return a physical id from which DELETE can
/// undo the effect on its own, even when CREATE only got partway.
#[async_trait]
pub trait CustomResource: Send + Sync + 'static {
    /// Typed, validated properties.
    type Properties: DeserializeOwned + Validate + PartialEq + Send + Sync;

    /// Type tag the handler serves.
    const TYPE_TAG: &'static str;

    /// Physical id the handler issues for these properties.
    ///
    /// Reported even when CREATE fails after touching anything, so the
    /// following DELETE can clean up.
    fn physical_id(&self, logical_id: &str, props: &Self::Properties) -> String;

    /// Creates the side effect.
    async fn create(&self, logical_id: &str, props: &Self::Properties) -> Result<HandlerOutput>;

    /// Converges an existing side effect to new properties.
    ///
    /// Returning a different physical id means a replacement; the engine
    /// then deletes the old one.
    async fn update(
        &self,
        logical_id: &str,
        physical_id: &str,
        props: &Self::Properties,
        old: Option<&Self::Properties>,
    ) -> Result<HandlerOutput>;

    /// Removes the side effect named by `physical_id`.
    ///
    /// Must warn and succeed when the id does not parse or the effect is
    /// already gone.
    async fn delete(&self, physical_id: &str) -> Result<()>;

    /// Outputs of an unchanged resource.
    fn outputs(&self, physical_id: &str, props: &Self::Properties) -> HashMap<String, String>;
}

/// A failed invocation.
#[derive(Debug)]
struct Failure {
    /// Id of whatever the handler may have left behind.
    physical_id: Option<String>,
    error: FleetError,
}

impl From<FleetError> for Failure {
    fn from(error: FleetError) -> Self {
        Self {
            physical_id: None,
            error,
        }
    }
}

impl From<ValidationError> for Failure {
    fn from(error: ValidationError) -> Self {
        FleetError::from(error).into()
    }
}

type Outcome = std::result::Result<HandlerOutput, Failure>;

#[async_trait]
trait Dispatch: Send + Sync {
    async fn handle(&self, request: &InvocationRequest) -> Outcome;
}

struct Typed<H>(H);

impl<H: CustomResource> Typed<H> {
    /// Creates, keeping the derived id on failure.
    async fn create(&self, logical_id: &str, props: &H::Properties) -> Outcome {
        self.0.create(logical_id, props).await.map_err(|error| Failure {
            physical_id: Some(self.0.physical_id(logical_id, props)),
            error,
        })
    }
}

#[async_trait]
impl<H: CustomResource> Dispatch for Typed<H> {
    async fn handle(&self, request: &InvocationRequest) -> Outcome {
        let logical_id = request.logical_resource_id.as_str();

        match request.request_type {
            RequestKind::Create => {
                let props = decode_properties::<H::Properties>(
                    H::TYPE_TAG,
                    &request.resource_properties,
                )?;
                self.create(logical_id, &props).await
            }
            RequestKind::Update => {
                let physical_id = request.physical_resource_id.as_deref().ok_or_else(|| {
                    ValidationError::new(
                        H::TYPE_TAG,
                        Some(String::from("physicalResourceId")),
                        "UPDATE without a physical id",
                    )
                })?;
                let props = decode_properties::<H::Properties>(
                    H::TYPE_TAG,
                    &request.resource_properties,
                )?;

                if physical_id.starts_with(FAILED_ID_PREFIX) {
                    info!("{logical_id}: previous create failed, creating instead of updating");
                    return self.create(logical_id, &props).await;
                }

                let old = request
                    .old_resource_properties
                    .as_ref()
                    .and_then(|m| decode_properties::<H::Properties>(H::TYPE_TAG, m).ok());

                if old.as_ref() == Some(&props) {
                    debug!("{logical_id}: properties unchanged, keeping {physical_id}");
                    return Ok(HandlerOutput {
                        physical_id: physical_id.to_string(),
                        outputs: self.0.outputs(physical_id, &props),
                    });
                }

                Ok(self
                    .0
                    .update(logical_id, physical_id, &props, old.as_ref())
                    .await?)
            }
            RequestKind::Delete => match request.physical_resource_id.as_deref() {
                Some(id) if !id.starts_with(FAILED_ID_PREFIX) => {
                    self.0.delete(id).await?;
                    Ok(HandlerOutput::new(id))
                }
                other => {
                    warn!("{logical_id}: nothing was created, skipping delete");
                    Ok(HandlerOutput::new(
                        other.map_or_else(|| failed_physical_id(logical_id), String::from),
                    ))
                }
            },
        }
    }
}

/// Builder rejecting duplicate registrations.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<&'static str, Box<dyn Dispatch>>,
    duplicates: Vec<&'static str>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its type tag.
    #[must_use]
    pub fn register<H: CustomResource>(mut self, handler: H) -> Self {
        if self.handlers.contains_key(H::TYPE_TAG) {
            self.duplicates.push(H::TYPE_TAG);
        } else {
            self.handlers.insert(H::TYPE_TAG, Box::new(Typed(handler)));
        }
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a type tag was registered twice.
    pub fn build(self) -> Result<HandlerRegistry> {
        if let Some(type_tag) = self.duplicates.first() {
            return Err(ConfigError::DuplicateHandler {
                type_tag: (*type_tag).to_string(),
            }
            .into());
        }

        Ok(HandlerRegistry {
            handlers: self.handlers.into_iter().collect(),
        })
    }
}

/// Registry of custom resource handlers.
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Box<dyn Dispatch>>,
}

impl HandlerRegistry {
    /// Starts a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registered type tags, sorted.
    #[must_use]
    pub fn type_tags(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Checks that every expected type tag has a handler.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unregistered tag.
    pub fn ensure_registered(&self, expected: &[String]) -> Result<()> {
        match expected
            .iter()
            .find(|tag| !self.handlers.contains_key(tag.as_str()))
        {
            Some(tag) => Err(ConfigError::UnknownResourceType {
                type_tag: tag.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Runs one invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unknown, the properties are invalid,
    /// or the handler fails.
    pub async fn handle(&self, request: &InvocationRequest) -> Result<HandlerOutput> {
        self.run(request).await.map_err(|failure| failure.error)
    }

    /// Runs one invocation and turns the outcome into a response.
    ///
    /// A failed CREATE reports the handler's own id once the handler ran,
    /// and the placeholder id when the request never reached it.
    pub async fn dispatch(&self, request: &InvocationRequest) -> InvocationResponse {
        match self.run(request).await {
            Ok(output) => InvocationResponse::success(output),
            Err(Failure { physical_id, error }) => {
                error!(
                    "{:?} {} failed: {error}",
                    request.request_type, request.logical_resource_id
                );
                let physical_id = match (request.request_type, &request.physical_resource_id) {
                    (RequestKind::Update | RequestKind::Delete, Some(id))
                        if !id.starts_with(FAILED_ID_PREFIX) =>
                    {
                        id.clone()
                    }
                    _ => physical_id
                        .unwrap_or_else(|| failed_physical_id(&request.logical_resource_id)),
                };
                InvocationResponse::failed(physical_id, error.to_string())
            }
        }
    }

    async fn run(&self, request: &InvocationRequest) -> Outcome {
        let handler = self
            .handlers
            .get(request.resource_type.as_str())
            .ok_or_else(|| {
                FleetError::Config(ConfigError::UnknownResourceType {
                    type_tag: request.resource_type.clone(),
                })
            })?;

        info!(
            "{:?} {} ({})",
            request.request_type, request.logical_resource_id, request.resource_type
        );
        handler.handle(request).await
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.type_tags())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Deserialize, Validate)]
    #[serde(deny_unknown_fields)]
    struct CounterProps {
        #[validate(length(min = 1))]
        name: String,
        #[serde(default = "default_size")]
        size: u32,
    }

    const fn default_size() -> u32 {
        1
    }

    #[derive(Default, Clone)]
    struct Counter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CustomResource for Counter {
        type Properties = CounterProps;
        const TYPE_TAG: &'static str = "Custom::Counter";

        fn physical_id(&self, _logical_id: &str, props: &CounterProps) -> String {
            format!("custom:counter:{}", props.name)
        }

        async fn create(&self, logical_id: &str, props: &CounterProps) -> Result<HandlerOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if props.name == "broken" {
                return Err(FleetError::internal("half created"));
            }
            Ok(HandlerOutput::new(self.physical_id(logical_id, props)))
        }

        async fn update(
            &self,
            logical_id: &str,
            _physical_id: &str,
            props: &CounterProps,
            _old: Option<&CounterProps>,
        ) -> Result<HandlerOutput> {
            self.create(logical_id, props).await
        }

        async fn delete(&self, _physical_id: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn outputs(&self, _physical_id: &str, props: &CounterProps) -> HashMap<String, String> {
            HashMap::from([(String::from("Size"), props.size.to_string())])
        }
    }

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn request(kind: RequestKind, physical: Option<&str>, new: Value, old: Option<Value>) -> InvocationRequest {
        InvocationRequest {
            request_type: kind,
            resource_type: String::from("Custom::Counter"),
            logical_resource_id: String::from("Thing"),
            physical_resource_id: physical.map(String::from),
            resource_properties: props(new),
            old_resource_properties: old.map(props),
        }
    }

    fn registry(counter: &Counter) -> HandlerRegistry {
        HandlerRegistry::builder()
            .register(counter.clone())
            .build()
            .expect("registry")
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let result = HandlerRegistry::builder()
            .register(Counter::default())
            .register(Counter::default())
            .build();

        assert!(matches!(
            result,
            Err(FleetError::Config(ConfigError::DuplicateHandler { .. }))
        ));
    }

    #[test]
    fn test_missing_registration_detected_up_front() {
        let registry = registry(&Counter::default());

        assert!(registry.ensure_registered(&[String::from("Custom::Counter")]).is_ok());
        assert!(matches!(
            registry.ensure_registered(&[String::from("Custom::Missing")]),
            Err(FleetError::Config(ConfigError::UnknownResourceType { .. }))
        ));
    }

    #[tokio::test]
    async fn test_invalid_properties_never_reach_handler() {
        let counter = Counter::default();
        let registry = registry(&counter);

        let response = registry
            .dispatch(&request(RequestKind::Create, None, json!({"name": ""}), None))
            .await;

        assert!(!response.is_success());
        assert_eq!(response.physical_resource_id, "custom:failed:Thing");
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_equivalent_update_is_a_noop() {
        let counter = Counter::default();
        let registry = registry(&counter);

        let response = registry
            .dispatch(&request(
                RequestKind::Update,
                Some("custom:counter:a"),
                json!({"ServiceToken": "arn:x", "name": "a", "size": 1}),
                Some(json!({"ServiceToken": "arn:x", "name": "a"})),
            ))
            .await;

        assert!(response.is_success());
        assert_eq!(response.physical_resource_id, "custom:counter:a");
        assert_eq!(response.data.get("Size").map(String::as_str), Some("1"));
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_of_failed_create_is_a_noop() {
        let counter = Counter::default();
        let registry = registry(&counter);

        let response = registry
            .dispatch(&request(
                RequestKind::Delete,
                Some("custom:failed:Thing"),
                json!({"garbage": true}),
                None,
            ))
            .await;

        assert!(response.is_success());
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_failure_reports_its_own_id() {
        let counter = Counter::default();
        let registry = registry(&counter);

        let response = registry
            .dispatch(&request(RequestKind::Create, None, json!({"name": "broken"}), None))
            .await;

        assert!(!response.is_success());
        assert_eq!(response.physical_resource_id, "custom:counter:broken");
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_type_fails_the_invocation() {
        let registry = registry(&Counter::default());
        let mut req = request(RequestKind::Create, None, json!({"name": "a"}), None);
        req.resource_type = String::from("Custom::Nope");

        let response = registry.dispatch(&req).await;
        assert!(!response.is_success());
        assert!(response.reason.unwrap_or_default().contains("Custom::Nope"));
    }
}
