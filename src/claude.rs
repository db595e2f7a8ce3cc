//! Claude API Client
//!
//! Anthropic Messages API backend. One system block plus one user message per
//! call, temperature 0, with a uniform per-request timeout.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{Backend, BackendError};
use crate::config::Config;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude API client
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: Option<String>,
    model: String,
    max_tokens: usize,
    endpoint: String,
}

/// Message in conversation
#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

/// API request
#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

/// API response
#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

impl ClaudeClient {
    pub fn new(
        api_key: Option<&str>,
        model: &str,
        max_tokens: usize,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Rejected(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.map(|s| s.to_string()),
            model: model.to_string(),
            max_tokens,
            endpoint: ANTHROPIC_API_URL.to_string(),
        })
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        Self::new(
            config.anthropic_api_key.as_deref(),
            &config.model,
            config.max_tokens,
            config.request_timeout,
        )
    }

    /// Point at a different Messages API endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Backend for ClaudeClient {
    fn name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, system: &str, message: &str) -> Result<String, BackendError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| BackendError::Rejected("ANTHROPIC_API_KEY not set".to_string()))?;

        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            system,
            messages: vec![Message {
                role: "user",
                content: message,
            }],
        };

        debug!("Calling Claude API: model={}, prompt_len={}", self.model, message.len());

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &text));
        }

        let result: MessageResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("unreadable response body: {}", e)))?;

        let content = result
            .content
            .into_iter()
            .filter_map(|b| if b.r#type == "text" { b.text } else { None })
            .collect::<Vec<_>>()
            .join("\n");

        info!(
            "Claude response: model={}, in={}, out={}",
            self.model, result.usage.input_tokens, result.usage.output_tokens
        );

        Ok(content.trim().to_string())
    }
}

/// Map a non-success HTTP status onto the backend taxonomy
fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> BackendError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        BackendError::RateLimited { retry_after }
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        BackendError::Transient(format!("Claude API error {}: {}", status, body))
    } else {
        BackendError::Rejected(format!("Claude API error {}: {}", status, body))
    }
}

/// Transport failures (connect, timeout, reset) retry; unbuildable requests do not
fn classify_transport(err: reqwest::Error) -> BackendError {
    if err.is_builder() {
        BackendError::Rejected(format!("invalid request: {}", err))
    } else if err.is_timeout() {
        BackendError::Transient(format!("request timed out: {}", err))
    } else if err.is_connect() {
        BackendError::Transient(format!("connection failed: {}", err))
    } else {
        BackendError::Transient(err.to_string())
    }
}
