//! Answer generation and faithfulness verification
//!
//! Composes an evidence prompt from the pruned chunks, calls the LLM, and
//! maps the `[i]` citations in the answer back to evidence pointers. An
//! optional verification pass scores faithfulness as the fraction of
//! answer sentences entailed by the cited evidence and retries once with
//! stricter prompting when the score is too low.

use crate::config::GeneratorConfig;
use crate::domain::error::Error;
use crate::domain::ports::{CompletionClient, CompletionRequest};
use crate::domain::types::EvidencePointer;
use crate::igp::PrunedChunk;
use crate::providers::llm::RetryPolicy;
use regex::Regex;
use std::sync::Arc;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("citation pattern is valid"));

static SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([01](?:\.\d+)?)").expect("score pattern is valid"));

const SYSTEM_SECTION: &str = "You answer questions about a code bundle using only the provided evidence.\nCite evidence as [i] after every claim it supports. If the evidence is insufficient, say so plainly.";

const STRICT_SUFFIX: &str = "\nEvery single sentence MUST carry at least one [i] citation and MUST be directly supported by the cited evidence. Do not speculate.";

/// A generated answer with its citations.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorOutput {
    /// The answer text
    pub answer: String,
    /// Cited evidence, in order of first citation
    pub sources: Vec<EvidencePointer>,
    /// Faithfulness in [0,1] when verification ran
    pub faithfulness: Option<f32>,
}

/// Terminal generation failure carrying whatever evidence had already been
/// assembled into the prompt.
#[derive(Debug)]
pub struct GenerationFailure {
    /// The underlying error (terminal or cancellation)
    pub error: Error,
    /// Evidence pointers of the chunks that were in the prompt
    pub partial_sources: Vec<EvidencePointer>,
}

/// Composes prompts, generates, and verifies.
pub struct Generator {
    client: Arc<dyn CompletionClient>,
    config: GeneratorConfig,
    retry: RetryPolicy,
}

impl Generator {
    /// Create a generator over a completion client.
    pub fn new(client: Arc<dyn CompletionClient>, config: GeneratorConfig, retry: RetryPolicy) -> Self {
        Self { client, config, retry }
    }

    /// Generate an answer over the pruned evidence.
    ///
    /// With `verify` set, a second LLM call scores faithfulness; a score
    /// under the configured threshold triggers one stricter retry when
    /// `retry_on_low_faithfulness` is enabled.
    pub async fn generate(
        &self,
        question: &str,
        evidence: &[PrunedChunk],
        verify: bool,
        cancel: &CancellationToken,
    ) -> std::result::Result<GeneratorOutput, GenerationFailure> {
        let (prompt, included) = self.compose_prompt(question, evidence, false);
        let partial_sources: Vec<EvidencePointer> =
            included.iter().map(|c| EvidencePointer::from_chunk(&c.chunk)).collect();

        let first = self
            .complete(&prompt, cancel)
            .await
            .map_err(|error| GenerationFailure { error, partial_sources: partial_sources.clone() })?;
        let mut output = self.collect_output(&first, &included);

        if !verify {
            return Ok(output);
        }

        let score = self.verify(question, &output, cancel).await;
        output.faithfulness = score;

        let below_threshold =
            score.map(|s| s < self.config.faithfulness_threshold).unwrap_or(false);
        if below_threshold && self.config.retry_on_low_faithfulness {
            debug!(score = score.unwrap_or(0.0), "faithfulness below threshold, retrying strictly");
            let (strict_prompt, strict_included) = self.compose_prompt(question, evidence, true);
            match self.complete(&strict_prompt, cancel).await {
                Ok(text) => {
                    let mut retried = self.collect_output(&text, &strict_included);
                    retried.faithfulness = self.verify(question, &retried, cancel).await;
                    return Ok(retried);
                }
                Err(e) => {
                    // The first answer is still usable; surface it with its
                    // honest score instead of failing the query.
                    warn!(error = %e, "strict retry failed, returning first answer");
                    return Ok(output);
                }
            }
        }
        Ok(output)
    }

    /// Enumerate evidence into the prompt up to the character budget.
    fn compose_prompt<'a>(
        &self,
        question: &str,
        evidence: &'a [PrunedChunk],
        strict: bool,
    ) -> (String, Vec<&'a PrunedChunk>) {
        let mut prompt = String::from(SYSTEM_SECTION);
        if strict {
            prompt.push_str(STRICT_SUFFIX);
        }
        prompt.push_str("\n\nEvidence:\n");

        let mut included = Vec::new();
        for (i, chunk) in evidence.iter().enumerate() {
            let entry = format!("[{}] {} — {}\n", i + 1, chunk.chunk.location(), chunk.chunk.content);
            if prompt.len() + entry.len() > self.config.prompt_budget_chars {
                debug!(included = included.len(), total = evidence.len(), "prompt budget reached");
                break;
            }
            prompt.push_str(&entry);
            included.push(chunk);
        }

        prompt.push_str("\nQuestion: ");
        prompt.push_str(question);
        prompt.push_str("\nAnswer:");
        (prompt, included)
    }

    /// One completion with retry; exhausted transient failures become
    /// terminal, cancellation wins over an in-flight call.
    async fn complete(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> crate::domain::error::Result<String> {
        let request = CompletionRequest {
            prompt: prompt.to_string(),
            max_tokens: self.config.max_answer_tokens,
            temperature: 0.0,
            top_logprobs: None,
        };
        let call = self.retry.run(|| self.client.complete(request.clone()));
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = call => match result {
                Ok(completion) => Ok(completion.text),
                Err(Error::LlmTransient { message }) => {
                    Err(Error::llm_terminal(format!("retries exhausted: {message}")))
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Map `[i]` citations back to sources, in order of first citation.
    fn collect_output(&self, answer: &str, included: &[&PrunedChunk]) -> GeneratorOutput {
        let mut seen = Vec::new();
        for caps in CITATION.captures_iter(answer) {
            if let Ok(idx) = caps[1].parse::<usize>() {
                if idx >= 1 && idx <= included.len() && !seen.contains(&idx) {
                    seen.push(idx);
                }
            }
        }
        let sources = seen
            .iter()
            .map(|&idx| EvidencePointer::from_chunk(&included[idx - 1].chunk))
            .collect();
        GeneratorOutput { answer: answer.trim().to_string(), sources, faithfulness: None }
    }

    /// Score faithfulness of an answer against its cited evidence.
    async fn verify(
        &self,
        question: &str,
        output: &GeneratorOutput,
        cancel: &CancellationToken,
    ) -> Option<f32> {
        if output.sources.is_empty() {
            return Some(0.0);
        }
        let evidence: String = output
            .sources
            .iter()
            .filter_map(|s| s.snippet.as_deref())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt = format!(
            "Score how faithful the answer is to the evidence: the fraction of answer sentences \
             that are entailed by the evidence.\n\nQuestion: {question}\n\nEvidence:\n{evidence}\n\n\
             Answer:\n{}\n\nRespond with a single number between 0 and 1.",
            output.answer
        );
        match self.complete(&prompt, cancel).await {
            Ok(text) => parse_score(&text),
            Err(e) => {
                warn!(error = %e, "faithfulness verification failed");
                None
            }
        }
    }
}

/// First number in [0,1] found in a verifier response.
fn parse_score(text: &str) -> Option<f32> {
    SCORE
        .captures(text)
        .and_then(|caps| caps[1].parse::<f32>().ok())
        .map(|s| s.clamp(0.0, 1.0))
}
