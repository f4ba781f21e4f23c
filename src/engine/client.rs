//! HTTP client for the declarative engine control API.
//!
//! The same control API also fronts the registry, alarm and multi-region
//! table services, so one client implements every remote seam except the
//! object store.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ConfigError, EngineError, FleetError, Result};

use super::api::DeclarativeEngine;
use super::services::{
    AlarmDefinition, AlarmService, ContainerRegistry, MultiRegionTables, TableDescription,
};
use super::types::{ChangeRequest, NewChangeRequest, ResourceRecord, UnitDescription};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Backoff step between retries in milliseconds, when the engine gives no
/// `retry-after`.
const RETRY_DELAY_MS: u64 = 1000;

/// Body fragments the engine uses when a session token has expired.
const EXPIRED_TOKEN_MARKERS: &[&str] = &["ExpiredToken", "expired token", "token has expired"];

/// Engine control API client.
#[derive(Debug, Clone)]
pub struct EngineClient {
    /// HTTP client.
    client: Client,
    /// Base URL.
    base_url: Url,
    /// Bearer token.
    token: String,
}

#[derive(Debug, Deserialize)]
struct CreatedChange {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AlarmNames {
    names: Vec<String>,
}

impl EngineClient {
    /// Creates a new engine client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid base URL or the
    /// HTTP client cannot be created.
    pub fn with_timeout(base_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                ConfigError::validation(
                    format!("'{base_url}' is not a valid base URL"),
                    "engine.endpoint",
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    /// Builds the URL of a resource; every segment and query value is
    /// percent-encoded.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Sends a request, retrying transient failures.
    ///
    /// Waits as long as the engine's `retry-after` asks, or backs off
    /// linearly. Returns `None` when the engine answers 404.
    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<String>> {
        let mut last_error: Option<FleetError> = None;

        for attempt in 0..MAX_RETRIES {
            if let Some(e) = &last_error {
                let delay = e.retry_delay_secs().map_or_else(
                    || Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt)),
                    Duration::from_secs,
                );
                debug!(
                    "Retry attempt {attempt} of {MAX_RETRIES} for {method} {} in {delay:?}",
                    url.path()
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(method.clone(), url, body).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            FleetError::Engine(EngineError::network("Max retries exceeded"))
        }))
    }

    /// Sends a single request.
    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<String>> {
        trace!("{method} {url}");

        let mut request = self
            .client
            .request(method, url.clone())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::network(format!("Request failed: {e}")))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let retry_after = if retry_after == 0 { 5 } else { retry_after };
            return Err(EngineError::Throttled {
                retry_after_secs: retry_after,
            }
            .into());
        }

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let text = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(classify_auth_failure(&text).into());
        }

        if status.is_server_error() {
            return Err(EngineError::network(format!("{status}: {text}")).into());
        }

        if !status.is_success() {
            return Err(EngineError::rejected(status.as_u16(), text).into());
        }

        Ok(Some(text))
    }

    /// Sends a request and decodes a JSON body; 404 maps to `None`.
    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<T>> {
        let Some(text) = self.send(method, url, body).await? else {
            return Ok(None);
        };

        serde_json::from_str(&text).map(Some).map_err(|e| {
            EngineError::InvalidResponse {
                message: format!("Failed to parse response from {}: {e}", url.path()),
            }
            .into()
        })
    }

    /// Sends a request whose body is ignored; 404 maps to a not-found error.
    async fn call(&self, method: Method, url: &Url, kind: &str, name: &str) -> Result<()> {
        match self.send(method, url, None).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::not_found(kind, name).into()),
        }
    }
}

/// Maps a 401/403 body to the right error class.
fn classify_auth_failure(body: &str) -> EngineError {
    if EXPIRED_TOKEN_MARKERS.iter().any(|m| body.contains(m)) {
        EngineError::CredentialsExpired {
            message: body.to_string(),
        }
    } else {
        EngineError::AuthenticationFailed {
            message: if body.is_empty() {
                String::from("Invalid engine token")
            } else {
                body.to_string()
            },
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| FleetError::internal(format!("Failed to encode request: {e}")))
}

#[async_trait]
impl DeclarativeEngine for EngineClient {
    async fn describe_unit(&self, unit: &str) -> Result<Option<UnitDescription>> {
        self.fetch(Method::GET, &self.url(&["units", unit], &[]), None)
            .await
    }

    async fn list_change_requests(&self, unit: &str) -> Result<Vec<ChangeRequest>> {
        let url = self.url(&["units", unit, "changes"], &[]);
        Ok(self.fetch(Method::GET, &url, None).await?.unwrap_or_default())
    }

    async fn create_change_request(&self, request: &NewChangeRequest) -> Result<String> {
        let body = to_json(request)?;
        let url = self.url(&["units", &request.unit, "changes"], &[]);
        let created: Option<CreatedChange> = self.fetch(Method::POST, &url, Some(&body)).await?;
        created
            .map(|c| c.id)
            .ok_or_else(|| EngineError::not_found("unit", &request.unit).into())
    }

    async fn describe_change_request(&self, unit: &str, change_id: &str) -> Result<ChangeRequest> {
        let url = self.url(&["units", unit, "changes", change_id], &[]);
        self.fetch(Method::GET, &url, None)
            .await?
            .ok_or_else(|| EngineError::not_found("change request", change_id).into())
    }

    async fn execute_change_request(&self, unit: &str, change_id: &str) -> Result<()> {
        let url = self.url(&["units", unit, "changes", change_id, "execute"], &[]);
        self.call(Method::POST, &url, "change request", change_id).await
    }

    async fn delete_change_request(&self, unit: &str, change_id: &str) -> Result<()> {
        let url = self.url(&["units", unit, "changes", change_id], &[]);
        self.call(Method::DELETE, &url, "change request", change_id).await
    }

    async fn list_unit_resources(&self, unit: &str) -> Result<Vec<ResourceRecord>> {
        self.fetch(Method::GET, &self.url(&["units", unit, "resources"], &[]), None)
            .await?
            .ok_or_else(|| EngineError::not_found("unit", unit).into())
    }

    async fn delete_unit(&self, unit: &str) -> Result<()> {
        let url = self.url(&["units", unit], &[]);
        self.call(Method::DELETE, &url, "unit", unit).await
    }
}

#[async_trait]
impl ContainerRegistry for EngineClient {
    async fn force_delete_repository(&self, name: &str) -> Result<()> {
        let url = self.url(&["registries", name], &[("force", "true")]);
        if self.send(Method::DELETE, &url, None).await?.is_none() {
            debug!("Repository {name} already removed");
        }
        Ok(())
    }
}

#[async_trait]
impl AlarmService for EngineClient {
    async fn put_alarm(&self, alarm: &AlarmDefinition) -> Result<()> {
        let body = to_json(alarm)?;
        let url = self.url(&["alarms", &alarm.name], &[]);
        self.send(Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }

    async fn list_alarms(&self, prefix: &str) -> Result<Vec<String>> {
        let url = self.url(&["alarms"], &[("prefix", prefix)]);
        let names: Option<AlarmNames> = self.fetch(Method::GET, &url, None).await?;
        Ok(names.map(|n| n.names).unwrap_or_default())
    }

    async fn delete_alarms(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({ "names": names });
        let url = self.url(&["alarms", "delete"], &[]);
        self.send(Method::POST, &url, Some(&body)).await?;
        Ok(())
    }
}

#[async_trait]
impl MultiRegionTables for EngineClient {
    async fn describe_table(&self, name: &str) -> Result<Option<TableDescription>> {
        self.fetch(Method::GET, &self.url(&["tables", name], &[]), None)
            .await
    }

    async fn remove_replica(&self, name: &str, region: &str) -> Result<()> {
        let url = self.url(&["tables", name, "replicas", region], &[]);
        self.call(Method::DELETE, &url, "replica", &format!("{name}/{region}"))
            .await
    }

    async fn delete_table(&self, name: &str) -> Result<()> {
        let url = self.url(&["tables", name], &[]);
        self.call(Method::DELETE, &url, "table", name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::UnitStatus;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_describe_unit_parses_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/units/app"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "app",
                "status": "CREATE_COMPLETE",
                "outputs": { "Url": "https://app.example" }
            })))
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri(), "secret").expect("client");
        let unit = client
            .describe_unit("app")
            .await
            .expect("describe")
            .expect("unit exists");

        assert_eq!(unit.status, UnitStatus::CreateComplete);
        assert_eq!(unit.outputs["Url"], "https://app.example");
    }

    #[tokio::test]
    async fn test_missing_unit_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/units/ghost"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri(), "secret").expect("client");
        assert!(client.describe_unit("ghost").await.expect("describe").is_none());

        let err = client
            .list_unit_resources("ghost")
            .await
            .expect_err("resources of a missing unit");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_expired_token_is_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/units/app"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("ExpiredToken: session expired"),
            )
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri(), "secret").expect("client");
        let err = client.describe_unit("app").await.expect_err("expired");
        assert!(err.is_credential_expiry());
    }

    #[tokio::test]
    async fn test_bad_request_is_rejected_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/units/app/changes/c1/execute"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid template"))
            .expect(1)
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri(), "secret").expect("client");
        let err = client
            .execute_change_request("app", "c1")
            .await
            .expect_err("rejected");
        assert!(matches!(
            err,
            FleetError::Engine(EngineError::Rejected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_alarm_prefix_and_names_are_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alarms"))
            .and(query_param("prefix", "a&b-0123456789ab-"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "names": ["a&b-0123456789ab-errors"]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/registries/shop%2Fapp"))
            .and(query_param("force", "true"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri(), "secret").expect("client");
        let names = client
            .list_alarms("a&b-0123456789ab-")
            .await
            .expect("list");
        client
            .force_delete_repository("shop/app")
            .await
            .expect("delete repository");

        assert_eq!(names, vec!["a&b-0123456789ab-errors"]);
    }

    #[tokio::test]
    async fn test_throttled_request_waits_for_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/units/app"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/units/app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "app",
                "status": "UPDATE_COMPLETE"
            })))
            .mount(&server)
            .await;

        let client = EngineClient::new(&server.uri(), "secret").expect("client");
        let started = std::time::Instant::now();
        let unit = client
            .describe_unit("app")
            .await
            .expect("describe")
            .expect("unit exists");

        assert_eq!(unit.status, UnitStatus::UpdateComplete);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_endpoint_is_a_config_error() {
        let err = EngineClient::new("not a url", "secret").expect_err("invalid");
        assert!(matches!(err, FleetError::Config(_)));
    }

    #[test]
    fn test_classify_auth_failure() {
        assert!(matches!(
            classify_auth_failure("The security token has expired token"),
            EngineError::CredentialsExpired { .. }
        ));
        assert!(matches!(
            classify_auth_failure(""),
            EngineError::AuthenticationFailed { .. }
        ));
    }
}
