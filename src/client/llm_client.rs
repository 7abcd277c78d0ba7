//! Client for OpenAI-compatible chat completion endpoints.
//!
//! Works against OpenAI itself, aggregators such as OpenRouter, and local
//! servers (vLLM, Ollama) that expose `/chat/completions`.
//!
//! Foundation:
//! - K_i: The chat completions schema is shared by all these endpoints
//! - B_i: The API will respond within timeout (might fail)
//! - B_i: The first choice carries text content (might be null or blank)
//! - I^B: Network availability unknowable → retry with backoff

use crate::client::ModelGateway;
use crate::models::{BackendConfig, BackendError, IdeaforgeError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content, never blank
    pub content: String,
    /// Model used (may differ from requested)
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration: Duration,
}

impl ChatCompletionResponse {
    /// Pull the first choice's text, rejecting absent or blank content.
    fn into_content(self) -> std::result::Result<(String, Option<String>, Option<ChatUsage>), BackendError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(BackendError::EmptyReply)?;
        Ok((content, self.model, self.usage))
    }
}

/// LLM client for any OpenAI-compatible endpoint.
///
/// Retries network errors, 429s and 5xx responses with exponential backoff;
/// auth and not-found errors fail immediately.
pub struct LLMClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
    max_retries: u32,
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
    total_requests: AtomicU64,
}

impl LLMClient {
    /// Create a client from backend config and a resolved API key.
    pub fn new(config: &BackendConfig, api_key: Option<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(IdeaforgeError::Network)?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
            max_retries: config.max_retries.max(1),
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        if let Some(ref api_key) = self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                IdeaforgeError::Internal("API key contains invalid header characters".to_string())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-title", HeaderValue::from_static("ideaforge"));

        Ok(headers)
    }

    /// Complete a chat request.
    pub async fn complete(&self, messages: Vec<Message>) -> Result<CompletionResponse> {
        let start = Instant::now();
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let headers = self.headers()?;
        let mut last_error: Option<IdeaforgeError> = None;

        for attempt in 0..self.max_retries {
            let is_last = attempt + 1 == self.max_retries;

            let response = self
                .client
                .post(&url)
                .headers(headers.clone())
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        IdeaforgeError::Timeout(self.timeout)
                    } else {
                        IdeaforgeError::Network(e)
                    });
                    if !is_last {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = retry_after_secs(response.headers());

                last_error = Some(IdeaforgeError::Backend(BackendError::RateLimited {
                    retry_after_secs: retry_after,
                }));

                if !is_last {
                    debug!(
                        attempt = attempt,
                        retry_after_secs = retry_after,
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                }
                continue;
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                    .map(|e| e.error.message)
                    .unwrap_or(error_body);

                let error = match status {
                    401 => BackendError::AuthenticationFailed,
                    404 => BackendError::ModelNotFound(self.model.clone()),
                    _ => BackendError::Api { status, message },
                };
                last_error = Some(IdeaforgeError::Backend(error));

                // Don't retry auth errors, unknown models or other client errors
                if status < 500 {
                    break;
                }

                if !is_last {
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
                continue;
            }

            let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                BackendError::InvalidResponse(format!("Failed to parse response: {e}"))
            })?;

            let (content, model, usage) = body.into_content()?;
            let (input_tokens, output_tokens) = usage
                .map(|u| (u.prompt_tokens, u.completion_tokens))
                .unwrap_or((0, 0));

            self.total_input_tokens
                .fetch_add(input_tokens as u64, Ordering::Relaxed);
            self.total_output_tokens
                .fetch_add(output_tokens as u64, Ordering::Relaxed);
            self.total_requests.fetch_add(1, Ordering::Relaxed);

            return Ok(CompletionResponse {
                content,
                model: model.unwrap_or_else(|| self.model.clone()),
                input_tokens,
                output_tokens,
                duration: start.elapsed(),
            });
        }

        Err(last_error.unwrap_or_else(|| {
            IdeaforgeError::Backend(BackendError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            })
        }))
    }

    /// Get total tokens tracked as (input, output).
    pub fn total_tokens(&self) -> (u64, u64) {
        (
            self.total_input_tokens.load(Ordering::Relaxed),
            self.total_output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Successful requests so far.
    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }
}

/// Seconds to wait from a `retry-after` header, 1s when absent or unusable.
fn retry_after_secs(headers: &HeaderMap) -> f64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(1.0)
}

#[async_trait]
impl ModelGateway for LLMClient {
    async fn query(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        debug!(system = system_prompt, user = user_prompt, "Querying model");

        let response = self
            .complete(vec![Message::system(system_prompt), Message::user(user_prompt)])
            .await?;

        debug!(
            model = %response.model,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            duration_ms = response.duration.as_millis() as u64,
            reply = %response.content,
            "Model replied"
        );

        Ok(response.content)
    }
}
