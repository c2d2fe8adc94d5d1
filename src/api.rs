//! Client side of the simulation backend.
//!
//! [`ApiClient`] is the shared HTTP plumbing (base URL, bearer token, error
//! normalisation). [`SimulationApi`] is the seam the session talks to, with
//! an HTTP implementation and an offline one driven by the local heuristic.

use anyhow::Context;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ScoreWeights;
use crate::data::{
    first_present, ScoreOrigin, SimulationDetail, SimulationRunResponse, SimulationSummary,
    StartupBrief, Urgency,
};
use crate::scoring::score_brief;
use crate::storage::{load_json, KeyValueStore, ACCESS_TOKEN_KEY, AUTH_USER_KEY};

pub const RUN_FALLBACK: &str = "Simulation request failed.";
pub const LIST_FALLBACK: &str = "Unable to load simulations.";
pub const DETAIL_FALLBACK: &str = "Unable to load simulation details.";
pub const LIST_LIMIT: u32 = 50;

const RUN_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure talking to the backend, before it is reduced to a message
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response; `body` is the parsed JSON body when there was one.
    #[error("Request failed with status code {status}")]
    Status { status: u16, body: Option<Value> },

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Decode(String),
}

impl ApiError {
    fn body_message(&self, key: &str) -> Option<String> {
        let ApiError::Status { body: Some(body), .. } = self else {
            return None;
        };

        match body.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            // Validation errors carry a structured detail
            other => Some(other.to_string()),
        }
    }
}

/// Most specific message available: body `detail`, body `message`, the
/// error's own message, then `fallback`.
pub fn api_error_message(error: &ApiError, fallback: &str) -> String {
    error
        .body_message("detail")
        .or_else(|| error.body_message("message"))
        .or_else(|| Some(error.to_string()).filter(|m| !m.trim().is_empty()))
        .unwrap_or_else(|| fallback.to_string())
}

/// Human-readable failure surfaced to the session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SubmissionError {
    pub message: String,
}

impl SubmissionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn from_api(error: &ApiError, fallback: &str) -> Self {
        Self::new(api_error_message(error, fallback))
    }
}

/// HTTP plumbing shared by the simulation and auth clients
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, base_url, store))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store,
        }
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Email of the signed-in user, if one is stored
    pub fn current_user_email(&self) -> Option<String> {
        let user: Value = load_json(self.store(), AUTH_USER_KEY)?;
        user.get("email")
            .and_then(|e| e.as_str())
            .filter(|e| !e.trim().is_empty())
            .map(String::from)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `path` followed by `segment`, encoded as a single path segment
    fn segment_url(&self, path: &str, segment: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.url(path)).map_err(|e| ApiError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::Transport(format!("Base URL cannot take a path: {}", self.base_url)))?
            .push(segment);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .store
            .get(ACCESS_TOKEN_KEY)
            .ok()
            .flatten()
            .filter(|t| !t.trim().is_empty());

        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .ok()
                .and_then(|text| serde_json::from_str::<Value>(&text).ok());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .map_err(|e| ApiError::Decode(format!("Failed to parse response: {}", e)))
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        tracing::debug!(path = %path, "GET");
        let request = self.client.get(self.url(path)).query(query);
        self.send(request)
    }

    /// GET `path/<segment>`, with `segment` percent-encoded.
    pub fn get_json_at<T: DeserializeOwned>(&self, path: &str, segment: &str) -> Result<T, ApiError> {
        let url = self.segment_url(path, segment)?;
        tracing::debug!(url = %url, "GET");
        self.send(self.client.get(url))
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        tracing::debug!(path = %path, "POST");
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        self.send(request)
    }
}

/// Brief in the backend's snake_case schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendPayload {
    pub owner_email: Option<String>,
    pub startup_name: String,
    pub elevator_pitch: String,
    pub problem_statement: String,
    pub target_audience: String,
    pub problem_urgency: Urgency,
    pub primary_target_segment: String,
    pub geography: String,
    pub market_size_estimate: String,
    pub customer_behavior_pain_points: String,
    pub competitor_patterns: String,
    pub monthly_burn: String,
    pub estimated_cac: String,
    pub current_cash_in_hand: String,
    pub marketing_strategy: String,
}

impl BackendPayload {
    /// Structured fields win; quick-form fields fill the gaps.
    pub fn from_brief(brief: &StartupBrief, owner_email: Option<String>) -> Self {
        let pick = |candidates: &[&str]| first_present(candidates).unwrap_or("").to_string();

        Self {
            owner_email,
            startup_name: pick(&[brief.startup_name.as_str(), brief.name.as_str()]),
            elevator_pitch: brief.elevator_pitch.clone(),
            problem_statement: pick(&[brief.problem_statement.as_str(), brief.problem.as_str()]),
            target_audience: pick(&[brief.target_audience.as_str(), brief.target_market.as_str()]),
            problem_urgency: brief.problem_urgency,
            primary_target_segment: pick(&[brief.primary_target_segment.as_str(), brief.target_market.as_str()]),
            geography: brief.geography.clone(),
            market_size_estimate: brief.market_size_estimate.clone(),
            customer_behavior_pain_points: pick(&[brief.customer_behavior_pain_points.as_str(), brief.problem.as_str()]),
            competitor_patterns: brief.competitor_patterns.clone(),
            monthly_burn: brief.monthly_burn.clone(),
            estimated_cac: brief.estimated_cac.clone(),
            current_cash_in_hand: brief.current_cash_in_hand.clone(),
            marketing_strategy: pick(&[brief.marketing_strategy.as_str(), brief.revenue_model.as_str()]),
        }
    }
}

/// The simulation backend as seen by the session
pub trait SimulationApi: Send + Sync {
    fn run_simulation(&self, brief: &StartupBrief) -> Result<SimulationRunResponse, SubmissionError>;

    fn list_simulations(&self) -> Result<Vec<SimulationSummary>, SubmissionError>;

    fn get_simulation(&self, simulation_id: &str) -> Result<SimulationDetail, SubmissionError>;

    /// Whether results from this backend replace the local estimate.
    fn score_origin(&self) -> ScoreOrigin {
        ScoreOrigin::Confirmed
    }
}

pub struct HttpSimulationApi {
    client: ApiClient,
}

impl HttpSimulationApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

impl SimulationApi for HttpSimulationApi {
    fn run_simulation(&self, brief: &StartupBrief) -> Result<SimulationRunResponse, SubmissionError> {
        let payload = BackendPayload::from_brief(brief, self.client.current_user_email());
        self.client
            .post_json("/api/v1/simulations/run", &payload, Some(RUN_TIMEOUT))
            .map_err(|e| SubmissionError::from_api(&e, RUN_FALLBACK))
    }

    fn list_simulations(&self) -> Result<Vec<SimulationSummary>, SubmissionError> {
        let mut query = vec![("limit", LIST_LIMIT.to_string())];
        if let Some(email) = self.client.current_user_email() {
            query.insert(0, ("email", email));
        }

        let body: Value = self
            .client
            .get_json("/api/v1/simulations", &query)
            .map_err(|e| SubmissionError::from_api(&e, LIST_FALLBACK))?;

        if !body.is_array() {
            return Ok(Vec::new());
        }
        serde_json::from_value(body).map_err(|e| {
            SubmissionError::from_api(&ApiError::Decode(format!("Failed to parse response: {}", e)), LIST_FALLBACK)
        })
    }

    fn get_simulation(&self, simulation_id: &str) -> Result<SimulationDetail, SubmissionError> {
        self.client
            .get_json_at("/api/v1/simulations", simulation_id)
            .map_err(|e| SubmissionError::from_api(&e, DETAIL_FALLBACK))
    }
}

/// Answers runs from the local heuristic; nothing leaves the machine.
pub struct LocalSimulationApi {
    weights: ScoreWeights,
}

impl LocalSimulationApi {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }
}

impl SimulationApi for LocalSimulationApi {
    fn run_simulation(&self, brief: &StartupBrief) -> Result<SimulationRunResponse, SubmissionError> {
        let metrics = score_brief(brief, &self.weights);
        Ok(SimulationRunResponse {
            simulation_id: Some(Uuid::new_v4().to_string()),
            startup_name: brief.display_name().to_string(),
            status: Some("completed".to_string()),
            overall_score: metrics.overall(),
            metrics,
            ..Default::default()
        })
    }

    fn list_simulations(&self) -> Result<Vec<SimulationSummary>, SubmissionError> {
        Ok(Vec::new())
    }

    fn get_simulation(&self, _simulation_id: &str) -> Result<SimulationDetail, SubmissionError> {
        Err(SubmissionError::new("Simulation not found."))
    }

    fn score_origin(&self) -> ScoreOrigin {
        ScoreOrigin::Estimated
    }
}
