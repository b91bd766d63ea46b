//! Language-model oracle contract.
//!
//! An oracle takes a prompt and returns text that must contain exactly one
//! JSON object matching the caller's schema. Callers treat the text as
//! untrusted: [`parse_oracle_json`] rejects anything that is not a single
//! well-formed object of the expected shape, and each call site validates
//! ranges and enum keys on top of that.
//!
//! The core makes at most one attempt per call site. [`RetryingOracle`] is an
//! opt-in decorator for deployments that want transient-error retries.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::errors::PipelineError;

/// Transport-level oracle failures.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("empty completion")]
    Empty,
}

impl OracleError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) | Self::Empty => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::ParseError(_) => false,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one prompt and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// OpenAI-compatible `/chat/completions` oracle.
pub struct OpenAiOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl OpenAiOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": crate::prompts::ORACLE_SYSTEM_PREAMBLE},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| OracleError::ParseError(e.to_string()))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(OracleError::Empty);
        }
        debug!(model = %self.config.model, chars = content.len(), "Oracle completion received");
        Ok(content)
    }
}

/// Longest single backoff between oracle retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Retry decorator with exponential backoff on transient errors.
pub struct RetryingOracle<O> {
    inner: O,
    max_retries: u32,
    base_delay: Duration,
}

impl<O: Oracle> RetryingOracle<O> {
    pub fn new(inner: O, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

#[async_trait]
impl<O: Oracle> Oracle for RetryingOracle<O> {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff = backoff_for(self.base_delay, attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient oracle error, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `base * 2^attempt`, saturating at [`MAX_BACKOFF`].
fn backoff_for(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}

/// Locate the JSON object in a completion.
///
/// A fenced ```` ```json ```` block wins; otherwise the span from the first
/// `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    locate_json_object(text).map(|(start, end)| &text[start..end])
}

fn locate_json_object(text: &str) -> Option<(usize, usize)> {
    if let Some(fence) = text.find("```json") {
        let body_start = fence + 7;
        if let Some(len) = text[body_start..].find("```") {
            let body = &text[body_start..body_start + len];
            let trimmed = body.trim_start();
            if trimmed.starts_with('{') {
                let start = body_start + (body.len() - trimmed.len());
                let end = start + trimmed.trim_end().len();
                return Some((start, end));
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then_some((start, end + 1))
}

/// True when some `{` in `text` opens a complete JSON object.
fn contains_json_object(text: &str) -> bool {
    text.match_indices('{').any(|(i, _)| {
        matches!(
            serde_json::Deserializer::from_str(&text[i..])
                .into_iter::<Value>()
                .next(),
            Some(Ok(Value::Object(_)))
        )
    })
}

/// Extract and deserialize the single JSON object in `raw`.
///
/// A second complete object anywhere outside the extracted one is a
/// contract violation.
pub fn parse_oracle_json<T: DeserializeOwned>(raw: &str) -> Result<T, PipelineError> {
    let (start, end) = locate_json_object(raw)
        .ok_or_else(|| PipelineError::contract("response contains no JSON object"))?;
    if contains_json_object(&raw[..start]) || contains_json_object(&raw[end..]) {
        return Err(PipelineError::contract(
            "response contains more than one JSON object",
        ));
    }
    serde_json::from_str(&raw[start..end]).map_err(|e| PipelineError::contract(e.to_string()))
}

/// Require a confidence value inside [0, 1].
pub fn validate_confidence(value: f64) -> Result<f64, PipelineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(PipelineError::contract(format!(
            "confidence {value} outside [0, 1]"
        )))
    }
}
