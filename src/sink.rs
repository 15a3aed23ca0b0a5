use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const API_VERSION: &str = "2023-06-01";
const NUDGE_MAX_TOKENS: u32 = 50;
const REPLY_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOutcome {
    /// Short preview of the reply, empty when the sink has none.
    pub reply: String,
}

/// The effect performed when the countdown reaches zero. The scheduler never
/// looks inside: a failure is reported to the caller, logged, and the next
/// cycle proceeds on schedule regardless.
#[async_trait]
pub trait ActionSink: Send + Sync {
    async fn perform(&self, message: &str) -> Result<SinkOutcome, SinkError>;
}

#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ChatApiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_API_BASE.to_string(),
            model: model.into(),
        }
    }

    /// Override the endpoint, e.g. to point at a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Sends the nudge message to the Anthropic Messages API and keeps a preview
/// of the reply for the log.
pub struct ChatApiSink {
    config: ChatApiConfig,
    client: reqwest::Client,
}

impl ChatApiSink {
    pub fn new(config: ChatApiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

pub fn build_nudge_request(model: &str, message: &str) -> Value {
    serde_json::json!({
        "model": model,
        "max_tokens": NUDGE_MAX_TOKENS,
        "messages": [{ "role": "user", "content": message }],
    })
}

pub fn extract_reply_text(body: &Value) -> String {
    body.pointer("/content/0/text")
        .and_then(Value::as_str)
        .unwrap_or("")
        .chars()
        .take(REPLY_PREVIEW_CHARS)
        .collect()
}

pub fn map_http_error(status: reqwest::StatusCode, body: &str) -> SinkError {
    let detail = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => SinkError::Auth(detail),
        429 => SinkError::RateLimited(detail),
        529 => SinkError::Api(format!("API overloaded: {detail}")),
        s if s >= 500 => SinkError::Api(detail),
        _ => SinkError::Request(format!("HTTP {status}: {detail}")),
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}

#[async_trait]
impl ActionSink for ChatApiSink {
    async fn perform(&self, message: &str) -> Result<SinkOutcome, SinkError> {
        let body = build_nudge_request(&self.config.model, message);
        let url = format!("{}/v1/messages", self.config.base_url);
        debug!(model = %self.config.model, "sending nudge request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| SinkError::Request(format!("connection error: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            return Err(map_http_error(status, &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| SinkError::Request(format!("invalid response body: {err}")))?;
        Ok(SinkOutcome {
            reply: extract_reply_text(&body),
        })
    }
}

/// Dry-run sink: prints the nudge to stdout instead of calling the API.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

#[async_trait]
impl ActionSink for ConsoleSink {
    async fn perform(&self, message: &str) -> Result<SinkOutcome, SinkError> {
        println!("nudge: {message}");
        Ok(SinkOutcome {
            reply: String::new(),
        })
    }
}
