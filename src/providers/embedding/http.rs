//! OpenAI-compatible HTTP embedding provider
//!
//! Talks to any `/embeddings` endpoint speaking the OpenAI wire shape
//! (OpenAI, Ollama, vLLM, LM Studio). Batch requests are preferred; if the
//! endpoint rejects batching the provider transparently degrades to
//! sequential single-text calls, preserving order.

use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use crate::domain::types::Embedding;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::warn;

const EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP embedding provider.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    permits: Arc<Semaphore>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    /// Create a provider against an OpenAI-compatible base URL.
    pub fn new(
        api_base: String,
        api_key: Option<String>,
        model: String,
        dimensions: usize,
        permits: Arc<Semaphore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(EMBED_TIMEOUT)
            .build()
            .map_err(|e| Error::embedding(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model,
            dimensions,
            permits,
        })
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Embedding>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::internal("embedding semaphore closed"))?;

        let url = format!("{}/embeddings", self.api_base);
        let body = serde_json::json!({ "model": self.model, "input": inputs });
        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::embedding(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if batch_unsupported(status, &text) && inputs.len() > 1 {
                return Err(Error::Embedding { message: BATCH_UNSUPPORTED_MARKER.into() });
            }
            return Err(Error::embedding(format!("embedding endpoint returned {status}: {text}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("malformed embedding response: {e}")))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        if data.len() != inputs.len() {
            return Err(Error::embedding(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                data.len(),
                inputs.len()
            )));
        }

        data.into_iter()
            .map(|d| {
                if d.embedding.len() != self.dimensions {
                    return Err(Error::EmbedDimMismatch {
                        expected: self.dimensions,
                        actual: d.embedding.len(),
                    });
                }
                Ok(Embedding {
                    vector: d.embedding,
                    model: self.model.clone(),
                    dimensions: self.dimensions,
                })
            })
            .collect()
    }
}

const BATCH_UNSUPPORTED_MARKER: &str = "__batch_unsupported__";

/// Whether an error response means the endpoint cannot take array inputs.
fn batch_unsupported(status: reqwest::StatusCode, body: &str) -> bool {
    status == reqwest::StatusCode::NOT_IMPLEMENTED
        || status == reqwest::StatusCode::PAYLOAD_TOO_LARGE
        || (status == reqwest::StatusCode::BAD_REQUEST
            && (body.contains("batch") || body.contains("array") || body.contains("input")))
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut out = self.request(std::slice::from_ref(&text.to_string())).await?;
        out.pop().ok_or_else(|| Error::embedding("no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        match self.request(texts).await {
            Ok(embeddings) => Ok(embeddings),
            Err(Error::Embedding { message }) if message == BATCH_UNSUPPORTED_MARKER => {
                warn!(count = texts.len(), "batch embeddings unsupported, falling back to sequential calls");
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.embed(text).await?);
                }
                Ok(out)
            }
            Err(e) => Err(e),
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}
