//! Completion service contract and its HTTP client.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sous_core::CompletionConfig;
use tracing::{debug, warn};

use crate::error::ChatError;

/// Delay before the single retry of a failed upstream call.
const RETRY_DELAY_MS: u64 = 50;

/// Opaque text-generation backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Free-form completion.
    async fn complete(&self, prompt: &str) -> Result<String, ChatError>;

    /// Completion constrained to JSON output. The text may still be fenced
    /// or malformed; callers run it through `extract_structured`.
    async fn complete_json(&self, prompt: &str) -> Result<String, ChatError>;
}

/// Run `call`, retrying once after a short pause if the error is retryable.
pub(crate) async fn retry_once<T, F, Fut>(label: &str, mut call: F) -> Result<T, ChatError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChatError>>,
{
    match call().await {
        Ok(value) => Ok(value),
        Err(first) if first.is_retryable() => {
            warn!(upstream = %label, error = %first, "Upstream call failed, retrying once");
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
            call().await
        }
        Err(e) => Err(e),
    }
}

// =============================================================================
// Wire format (generateContent)
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// =============================================================================
// HttpCompletionClient
// =============================================================================

/// `generateContent`-style HTTP client.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: Client,
    config: CompletionConfig,
    api_key: String,
}

impl HttpCompletionClient {
    /// Build a client, reading the API key from the configured environment
    /// variable.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, ChatError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ChatError::Config(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &CompletionConfig, api_key: String) -> Result<Self, ChatError> {
        if api_key.trim().is_empty() {
            return Err(ChatError::Config("completion API key is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn send(&self, prompt: &str, json_mode: bool) -> Result<String, ChatError> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                response_mime_type: json_mode.then_some("application/json"),
            },
        };

        debug!(model = %self.config.model, json_mode, "Sending completion request");

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::UpstreamHttp {
                status: Some(status.as_u16()),
                message: format!("completion returned HTTP {}", status),
            });
        }

        extract_candidate_text(&text)
    }
}

/// First candidate's concatenated text parts.
fn extract_candidate_text(body: &str) -> Result<String, ChatError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::MalformedCompletion(format!("unreadable response: {}", e)))?;
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::MalformedCompletion("no candidates in response".to_string()))?;
    let text: String = candidate
        .content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();
    if text.trim().is_empty() {
        return Err(ChatError::MalformedCompletion(
            "candidate has no text".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        retry_once("completion", || self.send(prompt, false)).await
    }

    async fn complete_json(&self, prompt: &str) -> Result<String, ChatError> {
        retry_once("completion", || self.send(prompt, true)).await
    }
}
