//! Code-generation oracle abstraction.
//!
//! The [`Oracle`] trait decouples the workflows from the hosted model. The
//! production backend is [`GeminiOracle`], a blocking client for the Google
//! Generative Language `generateContent` endpoint. Tests use scripted oracles
//! that return queued replies without touching the network.

use std::env;
use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::OracleConfig;

/// Longest error-body excerpt carried in an [`OracleError`].
const ERROR_BODY_LIMIT: usize = 500;
/// `finishReason` of a candidate cut off by the output-token cap.
const FINISH_MAX_TOKENS: &str = "MAX_TOKENS";

/// One prompt for the oracle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleRequest {
    /// Optional system instruction, sent separately from the user turn.
    pub system: Option<String>,
    /// User turn text.
    pub prompt: String,
    /// Overrides the backend's configured output-token cap.
    pub max_output_tokens: Option<u32>,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Failure of one oracle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Worth retrying after a cooldown (quota, rate limit, 5xx, timeout).
    Transient { message: String },
    /// Retrying the same request will not help.
    Permanent { message: String },
}

impl OracleError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient { message } => write!(f, "transient oracle error: {message}"),
            Self::Permanent { message } => write!(f, "oracle error: {message}"),
        }
    }
}

impl std::error::Error for OracleError {}

/// Abstraction over code-generation backends.
pub trait Oracle: Send + Sync {
    /// Send `request` and return the reply text.
    fn generate(&self, request: &OracleRequest) -> Result<String, OracleError>;
}

/// Blocking client for `models/{model}:generateContent`.
pub struct GeminiOracle {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
}

impl GeminiOracle {
    /// Build a client from config, reading the key from `cfg.api_key_env`.
    pub fn from_config(cfg: &OracleConfig) -> Result<Self> {
        let api_key = env::var(&cfg.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("{} environment variable not set", cfg.api_key_env))?;
        Self::new(cfg, api_key)
    }

    pub fn new(cfg: &OracleConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build http client")?;
        info!(model = %cfg.model, "oracle client configured");
        Ok(Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            api_key,
            max_output_tokens: cfg.max_output_tokens,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl Oracle for GeminiOracle {
    #[instrument(skip_all, fields(model = %self.model, prompt_bytes = request.prompt.len()))]
    fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = GenerateContentRequest::from_request(
            request,
            request.max_output_tokens.unwrap_or(self.max_output_tokens),
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|err| {
                warn!(err = %err, "oracle request failed");
                if err.is_timeout() || err.is_connect() {
                    OracleError::transient(err.to_string())
                } else {
                    OracleError::permanent(err.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|err| OracleError::transient(format!("read response body: {err}")))?;

        if !status.is_success() {
            let err = classify_status(status, &text);
            warn!(status = status.as_u16(), transient = err.is_transient(), "oracle returned error status");
            return Err(err);
        }

        let reply = parse_reply(&text)?;
        debug!(reply_bytes = reply.len(), "oracle reply received");
        Ok(reply)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    candidate_count: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentRequest {
    fn from_request(request: &OracleRequest, max_output_tokens: u32) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(request.prompt.clone()),
                }],
            }],
            system_instruction: request.system.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part {
                    text: Some(system.clone()),
                }],
            }),
            generation_config: GenerationConfig {
                candidate_count: 1,
                max_output_tokens,
            },
        }
    }
}

/// Map a non-2xx status to a transient or permanent error.
fn classify_status(status: StatusCode, body: &str) -> OracleError {
    let excerpt: String = body.trim().chars().take(ERROR_BODY_LIMIT).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), excerpt);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        OracleError::transient(message)
    } else {
        OracleError::permanent(message)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_reply(body: &str) -> Result<String, OracleError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|err| OracleError::permanent(format!("parse response: {err}")))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(OracleError::permanent(format!("prompt blocked: {reason}")));
    }

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| OracleError::permanent("response had no candidates"))?;
    // MAX_TOKENS: the reply was cut off at the output cap.
    if candidate.finish_reason.as_deref() == Some(FINISH_MAX_TOKENS) {
        return Err(OracleError::permanent(format!(
            "reply truncated ({FINISH_MAX_TOKENS})"
        )));
    }
    let parts = candidate
        .content
        .map(|content| content.parts)
        .ok_or_else(|| OracleError::permanent("response candidate had no content"))?;

    let text: String = parts.into_iter().filter_map(|part| part.text).collect();
    if text.is_empty() {
        return Err(OracleError::permanent("response candidate had no text"));
    }
    Ok(text)
}
