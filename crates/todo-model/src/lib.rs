use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use todo_common::{ModelConfig, ModelProvider};
use todo_core::{Message, Role};
use tracing::{debug, warn};

/// Anything that can turn a transcript into the model's next raw reply.
pub trait ChatBackend {
    fn complete(&self, messages: &[Message]) -> Result<String, ModelError>;
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("model request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("model backend returned {status} after {attempts} attempt(s): {body}")]
    Status {
        status: u16,
        attempts: u32,
        body: String,
    },
    #[error("model response was malformed: {0}")]
    MalformedResponse(String),
    #[error("model backend is not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay after the given (1-based) failed attempt: doubles each time, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

enum AttemptError {
    Transport(reqwest::Error),
    Status { status: StatusCode, body: String },
    Malformed(String),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Malformed(_) => false,
        }
    }

    fn into_model_error(self, attempts: u32) -> ModelError {
        match self {
            Self::Transport(source) => ModelError::Transport { attempts, source },
            Self::Status { status, body } => ModelError::Status {
                status: status.as_u16(),
                attempts,
                body,
            },
            Self::Malformed(detail) => ModelError::MalformedResponse(detail),
        }
    }
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct ChatCompletionsClient {
    client: Client,
    url: String,
    model_id: String,
    api_key: Option<String>,
    provider: ModelProvider,
    json_mode: bool,
    retry: RetryPolicy,
}

impl ChatCompletionsClient {
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self, ModelError> {
        let base = config.base_url().ok_or_else(|| {
            ModelError::NotConfigured(format!(
                "no endpoint for provider {}",
                config.provider.as_str()
            ))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(ModelError::Client)?;
        Ok(Self {
            client,
            url: format!("{base}/chat/completions"),
            model_id: config.model_id.clone(),
            api_key,
            provider: config.provider.clone(),
            json_mode: config.json_mode,
            retry: RetryPolicy::from_config(config),
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn wire_role(&self, role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::ToolObservation => match self.provider {
                ModelProvider::OpenAi => "developer",
                ModelProvider::Ollama | ModelProvider::Custom => "user",
            },
        }
    }

    fn send_once(&self, request: &ChatRequest<'_>) -> Result<String, AttemptError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().map_err(AttemptError::Transport)?;
        let status = response.status();
        let body = response.text().map_err(AttemptError::Transport)?;
        if !status.is_success() {
            return Err(AttemptError::Status { status, body });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|err| AttemptError::Malformed(format!("{err}: {body}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AttemptError::Malformed("response has no message content".to_string()))
    }
}

impl ChatBackend for ChatCompletionsClient {
    fn complete(&self, messages: &[Message]) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &self.model_id,
            messages: messages
                .iter()
                .map(|message| WireMessage {
                    role: self.wire_role(message.role),
                    content: &message.content,
                })
                .collect(),
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut attempt = 0_u32;
        loop {
            attempt = attempt.saturating_add(1);
            debug!(attempt, messages = messages.len(), model = %self.model_id, "calling model");
            match self.send_once(&request) {
                Ok(content) => return Ok(content),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    let detail = err.into_model_error(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %detail,
                        "model call failed, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err.into_model_error(attempt)),
            }
        }
    }
}
