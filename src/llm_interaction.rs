use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

use crate::app_state::Credential;
use crate::constants;
use crate::error::GenerationError;

/// One outbound generation request, built fresh per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub objective: String,
}

impl PlanRequest {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
        }
    }
}

/// Where and how plans are requested.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            api_url: constants::API_URL.clone(),
            model: constants::PLANNER_MODEL.clone(),
            temperature: constants::DEFAULT_TEMPERATURE,
            timeout: *constants::REQUEST_TIMEOUT,
        }
    }
}

// Structures matching the chat-completions endpoint
#[derive(Serialize, Debug)]
pub(crate) struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize, Debug)]
pub(crate) struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

impl<'a> ChatCompletionRequest<'a> {
    fn for_objective(config: &'a PlannerConfig, request: &PlanRequest) -> Self {
        Self {
            model: &config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: constants::PLANNER_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: constants::objective_prompt(&request.objective),
                },
            ],
            temperature: config.temperature,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ServiceError>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ServiceError {
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: Option<ServiceError>,
}

/// Reads the service-provided reason out of a failure body, if there is one.
fn failure_reason(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
}

/// Maps a raw HTTP outcome onto the plan text or a typed failure.
pub(crate) fn interpret_response(success: bool, body: &str) -> Result<String, GenerationError> {
    if !success {
        return Err(GenerationError::upstream(failure_reason(body)));
    }

    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|_| GenerationError::Protocol)?;

    if let Some(service_error) = parsed.error {
        return Err(GenerationError::upstream(service_error.message));
    }

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(GenerationError::Protocol)
}

/// The external completion service, as seen by the action controller.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn generate_plan(
        &self,
        request: &PlanRequest,
        credential: &Credential,
    ) -> Result<String, GenerationError>;

    /// Upper bound on how long one call may take.
    fn timeout(&self) -> Duration {
        *constants::REQUEST_TIMEOUT
    }
}

/// Chat-completion client for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiPlanner {
    client: Client,
    config: PlannerConfig,
}

impl OpenAiPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }
}

impl Default for OpenAiPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

#[async_trait]
impl CompletionService for OpenAiPlanner {
    #[instrument(skip_all, fields(model = %self.config.model, objective_len = request.objective.len()))]
    async fn generate_plan(
        &self,
        request: &PlanRequest,
        credential: &Credential,
    ) -> Result<String, GenerationError> {
        let payload = ChatCompletionRequest::for_objective(&self.config, request);

        let response = self
            .client
            .post(&self.config.api_url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(credential.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!(error = %e, "Completion request could not be sent");
                GenerationError::transport(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            let e = e.without_url();
            error!(%status, error = %e, "Failed to read completion response body");
            GenerationError::transport(e.to_string())
        })?;

        if !status.is_success() {
            warn!(%status, "Completion service returned a failure status");
        }

        let outcome = interpret_response(status.is_success(), &body);
        match &outcome {
            Ok(plan) => debug!(plan_len = plan.len(), "Received plan from completion service"),
            Err(e) => warn!(kind = ?e.kind(), "Completion service call failed"),
        }
        outcome
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}
