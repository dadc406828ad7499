//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use preflight_core::domain::ports::{Completion, CompletionClient, CompletionRequest, TokenTopLogprobs};
use preflight_core::igp::{NuResult, UncertaintyProbe};
use preflight_core::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Completion client with a fixed answer and optional logprobs support.
pub struct ScriptedLlm {
    pub answer: String,
    pub supports_logprobs: bool,
}

impl ScriptedLlm {
    pub fn new(answer: &str) -> Self {
        Self { answer: answer.to_string(), supports_logprobs: true }
    }

    pub fn without_logprobs(answer: &str) -> Self {
        Self { answer: answer.to_string(), supports_logprobs: false }
    }
}

#[async_trait]
impl CompletionClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> preflight_core::Result<Completion> {
        if request.prompt.starts_with("Score how faithful") {
            return Ok(Completion { text: "0.9".into(), logprobs: None });
        }
        if request.top_logprobs.is_some() {
            if !self.supports_logprobs {
                return Err(Error::LogprobsUnsupported { provider: "scripted".into() });
            }
            // Uniform top-K distribution: NU 1.0 per token.
            let k = request.top_logprobs.unwrap() as usize;
            let lp = (1.0 / k as f64).ln();
            return Ok(Completion {
                text: "probe".into(),
                logprobs: Some(vec![TokenTopLogprobs {
                    token: "probe".into(),
                    logprobs: vec![lp; k],
                }]),
            });
        }
        Ok(Completion { text: self.answer.clone(), logprobs: None })
    }

    fn supports_logprobs(&self) -> bool {
        self.supports_logprobs
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Probe scripted by content markers, counting every call.
pub struct MarkerProbe {
    pub baseline: f64,
    pub markers: Vec<(&'static str, f64)>,
    pub calls: AtomicUsize,
}

impl MarkerProbe {
    pub fn new(baseline: f64, markers: Vec<(&'static str, f64)>) -> Self {
        Self { baseline, markers, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UncertaintyProbe for MarkerProbe {
    async fn measure(&self, prompt: &str) -> preflight_core::Result<NuResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let nu = if prompt.starts_with("Context:") {
            self.markers
                .iter()
                .find(|(marker, _)| prompt.contains(marker))
                .map(|(_, nu)| *nu)
                .unwrap_or(self.baseline)
        } else {
            self.baseline
        };
        Ok(NuResult { nu, tokens_seen: 1, duration_ms: 0 })
    }

    fn supports_logprobs(&self) -> bool {
        true
    }
}

/// Bag-of-words embedder over a fixed vocabulary; fully deterministic and
/// collision-free, for ranking assertions.
pub struct VocabEmbedder {
    vocab: Vec<&'static str>,
}

impl VocabEmbedder {
    pub fn new(vocab: Vec<&'static str>) -> Self {
        Self { vocab }
    }
}

#[async_trait]
impl preflight_core::domain::ports::EmbeddingProvider for VocabEmbedder {
    async fn embed(&self, text: &str) -> preflight_core::Result<preflight_core::Embedding> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .collect();
        let mut vector: Vec<f32> = self
            .vocab
            .iter()
            .map(|term| tokens.iter().filter(|t| **t == *term).count() as f32)
            .collect();
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(preflight_core::Embedding {
            vector,
            model: "vocab".into(),
            dimensions: self.vocab.len(),
        })
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> preflight_core::Result<Vec<preflight_core::Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.vocab.len()
    }

    fn provider_name(&self) -> &str {
        "vocab"
    }
}

/// Write a fixture file, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

/// The S1 fixture: one markdown section, one TypeScript file exporting
/// `foo`.
pub fn write_two_file_fixture(root: &Path) {
    write_file(root, "README.md", "# Readme\nfoo is the exported helper\n");
    write_file(
        root,
        "src/foo.ts",
        "export function foo(): string {\n    return \"foo\";\n}\n",
    );
}
