//! LLM completion client
//!
//! OpenAI-compatible `/chat/completions` adapter behind the
//! [`CompletionClient`] port, plus the retry policy shared by the
//! uncertainty calculator and the answer generator.
//!
//! Log-probability support is decided by [`url_supports_logprobs`], a pure
//! predicate on the provider base URL. The IG pruner consults it before
//! issuing any probe so unsupported providers short-circuit without a
//! wasted network round-trip.

use crate::config::LlmConfig;
use crate::domain::error::{Error, Result};
use crate::domain::ports::{Completion, CompletionClient, CompletionRequest, TokenTopLogprobs};
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Whether a provider base URL is known to return `top_logprobs`.
///
/// Pure string predicate, never a network probe. Unknown providers are
/// assumed capable; the short list below covers APIs that document the
/// field as absent.
pub fn url_supports_logprobs(api_base: &str) -> bool {
    let base = api_base.to_lowercase();
    const UNSUPPORTED: &[&str] = &[
        "api.anthropic.com",
        "generativelanguage.googleapis.com",
        "api.cohere.com",
        ":11434", // Ollama's OpenAI shim accepts the flag but returns nothing
    ];
    !UNSUPPORTED.iter().any(|marker| base.contains(marker))
}

/// Exponential backoff retry policy for transient LLM failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts beyond the first call
    pub max_retries: u32,
    /// First backoff delay
    pub backoff_base: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: u32,
}

impl RetryPolicy {
    /// Derive the policy from the LLM configuration section.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_factor: config.backoff_factor.max(1),
        }
    }

    /// Run `op`, retrying on [`Error::LlmTransient`] with exponential
    /// backoff. Non-transient errors and the final transient error are
    /// returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.backoff_base;
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(Error::LlmTransient { message }) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(attempt, delay_ms = delay.as_millis() as u64, %message, "transient LLM failure, backing off");
                    tokio::time::sleep(delay).await;
                    delay *= self.backoff_factor;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// OpenAI-compatible chat-completion client.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    permits: Arc<Semaphore>,
    supports_logprobs: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChoiceLogprobs {
    #[serde(default)]
    content: Vec<TokenLogprobEntry>,
}

#[derive(Deserialize)]
struct TokenLogprobEntry {
    token: String,
    #[serde(default)]
    top_logprobs: Vec<TopLogprobEntry>,
}

#[derive(Deserialize)]
struct TopLogprobEntry {
    logprob: f64,
}

impl HttpCompletionClient {
    /// Create a client from the LLM configuration section.
    pub fn new(config: &LlmConfig, permits: Arc<Semaphore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::llm_transient(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            permits,
            supports_logprobs: url_supports_logprobs(&config.api_base),
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        if request.top_logprobs.is_some() && !self.supports_logprobs {
            return Err(Error::LogprobsUnsupported { provider: self.api_base.clone() });
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::internal("LLM semaphore closed"))?;

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if let Some(top_k) = request.top_logprobs {
            body["logprobs"] = serde_json::json!(true);
            body["top_logprobs"] = serde_json::json!(top_k);
        }

        let url = format!("{}/chat/completions", self.api_base);
        let mut req = self.client.post(&url).json(&body).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::llm_transient(format!("completion timed out after {:?}", self.timeout))
            } else {
                Error::llm_transient(format!("completion request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::llm_transient(format!("completion endpoint returned {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::llm_terminal(format!("completion endpoint returned {status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::llm_transient(format!("malformed completion response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::llm_terminal("completion response had no choices"))?;

        let logprobs = if request.top_logprobs.is_some() {
            let entries = choice
                .logprobs
                .map(|lp| lp.content)
                .filter(|content| !content.is_empty())
                .ok_or_else(|| Error::LogprobsUnsupported { provider: self.api_base.clone() })?;
            Some(
                entries
                    .into_iter()
                    .map(|entry| TokenTopLogprobs {
                        token: entry.token,
                        logprobs: entry.top_logprobs.into_iter().map(|t| t.logprob).collect(),
                    })
                    .collect(),
            )
        } else {
            None
        };

        Ok(Completion { text: choice.message.content, logprobs })
    }

    fn supports_logprobs(&self) -> bool {
        self.supports_logprobs
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}
