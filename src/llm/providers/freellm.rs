//! FreeLLM chat provider (`POST /api/v1/chat`).
//!
//! Wire format is a single-message JSON body `{"message", "model"}` with a
//! bearer key; the reply is `{"success": bool, "response": str}`. The
//! endpoint is rate limited, so `complete` retries with a growing delay:
//! an HTTP 429 adds `rate_limit_backoff_seconds`, any other failure adds
//! `error_backoff_seconds`. A `success: false` reply is not retried.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::config::FreeLlmConfig;
use crate::llm::ProviderError;

const PROMPT_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct FreeLlmProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_retries: u32,
    retry_delay: Duration,
    rate_limit_backoff: Duration,
    error_backoff: Duration,
}

/// Outcome of one HTTP round-trip, before retry policy is applied.
enum Attempt {
    RateLimited,
    Transient(String),
    Fatal(ProviderError),
}

impl FreeLlmProvider {
    pub fn new(config: &FreeLlmConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_seconds),
            rate_limit_backoff: Duration::from_secs(config.rate_limit_backoff_seconds),
            error_backoff: Duration::from_secs(config.error_backoff_seconds),
        })
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        debug!(
            endpoint = %self.endpoint,
            prompt_len = prompt.len(),
            head = %preview(prompt),
            "sending prompt to FreeLLM"
        );

        self.with_backoff(|| self.send_once(prompt)).await
    }

    /// Run `send` up to `max_retries` times. No sleep precedes the first
    /// attempt; each later one waits the current delay, which grows by the
    /// kind of the previous failure.
    async fn with_backoff<F, Fut>(&self, mut send: F) -> Result<String, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, Attempt>>,
    {
        let mut delay = self.retry_delay;
        let mut last = String::from("no attempt made");

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                warn!(
                    attempt = attempt + 1,
                    max = self.max_retries,
                    delay_s = delay.as_secs(),
                    "FreeLLM: retrying"
                );
                tokio::time::sleep(delay).await;
            }

            match send().await {
                Ok(text) => return Ok(text),
                Err(Attempt::RateLimited) => {
                    warn!("FreeLLM: HTTP 429, backing off");
                    last = "HTTP 429 Too Many Requests".into();
                    delay += self.rate_limit_backoff;
                }
                Err(Attempt::Transient(msg)) => {
                    warn!(error = %msg, "FreeLLM: request failed");
                    last = msg;
                    delay += self.error_backoff;
                }
                Err(Attempt::Fatal(e)) => return Err(e),
            }
        }

        error!(attempts = self.max_retries, last = %last, "FreeLLM: retries exhausted");
        Err(ProviderError::Exhausted { attempts: self.max_retries, last })
    }

    async fn send_once(&self, prompt: &str) -> Result<String, Attempt> {
        let payload = ChatRequest { message: prompt, model: &self.model };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Attempt::Transient(format!("transport: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::RateLimited);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            return Err(Attempt::Transient(format!("HTTP {status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Attempt::Transient(format!("failed to read response body: {e}")))?;
        trace!(response = %body, "full FreeLLM response payload");

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Attempt::Transient(format!("failed to parse response body: {e}")))?;

        if parsed.success {
            Ok(parsed.response.unwrap_or_default())
        } else {
            Err(Attempt::Fatal(ProviderError::Api(body)))
        }
    }
}

fn preview(prompt: &str) -> String {
    prompt.chars().take(PROMPT_PREVIEW_CHARS).collect()
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    response: Option<String>,
}
