//! REST client for the fault-injection/lock server and the notification system.
//!
//! Responses are returned as raw status plus optional JSON body; mapping a
//! status to user-facing text is the job of [`crate::lock`] and
//! [`crate::scenario`]. An `Err` from these calls always means that no
//! response was received.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::Endpoints;
use crate::identity::ClientIdentity;
use crate::notifications::{Notification, NotificationEnvelope};
use crate::telemetry::LockState;

/// Header carrying the caller identity on scenario requests.
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// Default timeout for individual requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Status code and decoded body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body, if there was one and it parsed.
    pub body: Option<serde_json::Value>,
}

impl ApiResponse {
    /// Build a response.
    pub fn new(status: u16, body: Option<serde_json::Value>) -> Self {
        Self { status, body }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First string field found among `keys`.
    #[must_use]
    pub fn text_field(&self, keys: &[&str]) -> Option<String> {
        let body = self.body.as_ref()?;
        keys.iter()
            .filter_map(|k| body.get(*k))
            .find_map(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
    }

    /// Server-provided rejection reason (`detail`, or `reason`).
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.text_field(&["detail", "reason"])
    }

    /// Numeric field, accepting integers and floats.
    #[must_use]
    pub fn number_field(&self, key: &str) -> Option<f64> {
        self.body.as_ref()?.get(key)?.as_f64()
    }
}

/// Body of lock acquire/release requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdBody {
    /// Caller identity.
    pub client_id: String,
}

/// One entry of the scenario catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioInfo {
    /// Name used in the trigger path.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct ScenarioCatalogue {
    scenarios: BTreeMap<String, String>,
}

/// Requests against the fault-injection and lock-arbitration server.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// `POST /api/fault/scenario/{name}` with the caller-identity header.
    async fn trigger_scenario(
        &self,
        name: &str,
        identity: &ClientIdentity,
    ) -> crate::Result<ApiResponse>;

    /// `POST /api/fault/control/acquire`.
    async fn acquire_lock(&self, identity: &ClientIdentity) -> crate::Result<ApiResponse>;

    /// `POST /api/fault/control/release`.
    async fn release_lock(&self, identity: &ClientIdentity) -> crate::Result<ApiResponse>;

    /// `GET /api/fault/control/status`.
    async fn lock_status(&self) -> crate::Result<LockState>;

    /// `GET /api/fault/scenarios`.
    async fn list_scenarios(&self) -> crate::Result<Vec<ScenarioInfo>>;
}

/// Query side of the external quality-notification system.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// First page of notifications, newest first. Non-2xx statuses are errors.
    async fn query_notifications(&self, page_size: u32) -> crate::Result<Vec<Notification>>;
}

/// [`ControlApi`] and [`NotificationSource`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpApi {
    /// Create a client with the given per-request timeout.
    pub fn new(endpoints: Endpoints, request_timeout: Duration) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { http, endpoints })
    }

    /// Endpoints this client talks to.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn into_api_response(response: reqwest::Response) -> crate::Result<ApiResponse> {
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            None
        } else {
            serde_json::from_slice(&bytes).ok()
        };
        Ok(ApiResponse { status, body })
    }

    async fn post_identity(&self, url: url::Url, identity: &ClientIdentity) -> crate::Result<ApiResponse> {
        let response = self
            .http
            .post(url)
            .json(&ClientIdBody {
                client_id: identity.as_str().to_string(),
            })
            .send()
            .await?;
        Self::into_api_response(response).await
    }
}

#[async_trait]
impl ControlApi for HttpApi {
    async fn trigger_scenario(
        &self,
        name: &str,
        identity: &ClientIdentity,
    ) -> crate::Result<ApiResponse> {
        let response = self
            .http
            .post(self.endpoints.scenario(name)?)
            .header(CLIENT_ID_HEADER, identity.as_str())
            .send()
            .await?;
        Self::into_api_response(response).await
    }

    async fn acquire_lock(&self, identity: &ClientIdentity) -> crate::Result<ApiResponse> {
        self.post_identity(self.endpoints.acquire()?, identity).await
    }

    async fn release_lock(&self, identity: &ClientIdentity) -> crate::Result<ApiResponse> {
        self.post_identity(self.endpoints.release()?, identity).await
    }

    async fn lock_status(&self) -> crate::Result<LockState> {
        let state = self
            .http
            .get(self.endpoints.lock_status()?)
            .send()
            .await?
            .error_for_status()?
            .json::<LockState>()
            .await?;
        Ok(state)
    }

    async fn list_scenarios(&self) -> crate::Result<Vec<ScenarioInfo>> {
        let catalogue = self
            .http
            .get(self.endpoints.scenario_list()?)
            .send()
            .await?
            .error_for_status()?
            .json::<ScenarioCatalogue>()
            .await?;
        Ok(catalogue
            .scenarios
            .into_iter()
            .map(|(name, description)| ScenarioInfo { name, description })
            .collect())
    }
}

#[async_trait]
impl NotificationSource for HttpApi {
    async fn query_notifications(&self, page_size: u32) -> crate::Result<Vec<Notification>> {
        let envelope = self
            .http
            .get(self.endpoints.notifications(page_size)?)
            .send()
            .await?
            .error_for_status()?
            .json::<NotificationEnvelope>()
            .await?;
        Ok(envelope.d.results)
    }
}
