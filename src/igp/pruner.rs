//! Information-gain pruning
//!
//! Scores every retrieval candidate by how much it reduces the model's
//! uncertainty about the question: `IG = NU(q) − NU(q|d)`. Probes run in
//! batches with bounded concurrency; a failed probe ranks its candidate
//! last instead of failing the query, and cancellation is observed at
//! batch boundaries.

use crate::config::{CancelBehavior, IgpConfig, IgpStrategy};
use crate::domain::error::{Error, Result};
use crate::domain::types::Warning;
use crate::igp::nu::UncertaintyProbe;
use crate::retrieval::RetrievedChunk;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A candidate with its information-gain score.
#[derive(Debug, Clone, PartialEq)]
pub struct PrunedChunk {
    /// The candidate chunk
    pub chunk: crate::domain::types::Chunk,
    /// Raw information gain; negative when the chunk adds confusion, and
    /// `-inf` when its probe failed
    pub ig_score: f64,
    /// The retrieval score the candidate arrived with
    pub retrieval_score: f32,
    /// Fused ranking key, present only under the combined strategy
    pub combined_score: Option<f64>,
}

/// Full pruning report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneOutcome {
    /// Kept candidates, ranked per the active strategy
    pub ranked_chunks: Vec<PrunedChunk>,
    /// NU of the bare question
    pub baseline_nu: f64,
    /// Candidates that went through a probe
    pub chunks_processed: usize,
    /// Probe batches issued
    pub batches_used: usize,
    /// Wall-clock in milliseconds
    pub duration_ms: u64,
    /// Candidates received
    pub original_count: usize,
    /// Candidates kept
    pub pruned_count: usize,
    /// Share of candidates pruned away, in [0,1]
    pub pruning_ratio: f64,
    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
    /// Recoverable problems encountered
    pub warnings: Vec<Warning>,
}

/// Prompt for the bare question baseline.
pub fn question_prompt(question: &str) -> String {
    format!("Question: {question}\nAnswer:")
}

/// Prompt conditioning the question on one candidate's content, truncated
/// to the configured character budget.
pub fn conditioned_prompt(question: &str, content: &str, budget: usize) -> String {
    let mut cut = budget.min(content.len());
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("Context:\n{}\n\nQuestion: {question}\nAnswer:", &content[..cut])
}

/// Ranks or filters candidates by information gain.
pub struct IgPruner {
    config: IgpConfig,
    probe: Arc<dyn UncertaintyProbe>,
}

impl IgPruner {
    /// Create a pruner over an uncertainty probe.
    pub fn new(config: IgpConfig, probe: Arc<dyn UncertaintyProbe>) -> Self {
        Self { config, probe }
    }

    /// Prune a candidate list.
    pub async fn prune(
        &self,
        question: &str,
        candidates: Vec<RetrievedChunk>,
        cancel: &CancellationToken,
    ) -> Result<PruneOutcome> {
        let started = Instant::now();
        let original_count = candidates.len();

        if candidates.is_empty() {
            return Ok(PruneOutcome { duration_ms: started.elapsed().as_millis() as u64, ..Default::default() });
        }

        if !self.config.enabled {
            return Ok(passthrough(candidates, started, vec![]));
        }
        if !self.probe.supports_logprobs() {
            warn!("provider lacks top_logprobs; IG pruning disabled for this query");
            let warning = Warning {
                code: "LOGPROBS_UNSUPPORTED".into(),
                message: "completion provider does not return top_logprobs; candidates passed through unpruned".into(),
                recoverable: true,
            };
            return Ok(passthrough(candidates, started, vec![warning]));
        }

        if cancel.is_cancelled() {
            return self.cancelled_outcome(candidates, started, 0, 0, 0.0, vec![]);
        }

        let mut warnings = Vec::new();
        let baseline = match self.probe.measure(&question_prompt(question)).await {
            Ok(result) => result.nu,
            Err(e) => {
                // A dead baseline makes every IG meaningless; degrade to
                // pass-through instead of failing the whole query.
                warn!(error = %e, "baseline NU probe failed; IG pruning disabled for this query");
                warnings.push(Warning {
                    code: e.code().as_str().into(),
                    message: format!("baseline uncertainty probe failed: {e}"),
                    recoverable: true,
                });
                return Ok(passthrough(candidates, started, warnings));
            }
        };
        debug!(baseline, "baseline NU measured");

        let mut ig_scores: Vec<Option<f64>> = Vec::with_capacity(candidates.len());
        let mut batches_used = 0usize;
        let mut cancelled = false;

        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let probes = batch.iter().map(|candidate| {
                let prompt = conditioned_prompt(
                    question,
                    &candidate.chunk.content,
                    self.config.content_budget,
                );
                let probe = Arc::clone(&self.probe);
                async move { probe.measure(&prompt).await }
            });
            let results = join_all(probes).await;
            batches_used += 1;

            for (candidate, result) in batch.iter().zip(results) {
                match result {
                    Ok(measure) => ig_scores.push(Some(baseline - measure.nu)),
                    Err(e) => {
                        warn!(chunk = %candidate.chunk.id, error = %e, "candidate probe failed, ranking last");
                        warnings.push(Warning {
                            code: e.code().as_str().into(),
                            message: format!("probe failed for chunk {}: {e}", candidate.chunk.id),
                            recoverable: true,
                        });
                        ig_scores.push(None);
                    }
                }
            }
        }

        if cancelled && self.config.on_cancel == CancelBehavior::Propagate {
            return Err(Error::Cancelled);
        }

        let chunks_processed = ig_scores.len();
        let scored: Vec<PrunedChunk> = candidates
            .into_iter()
            .take(chunks_processed)
            .zip(ig_scores)
            .map(|(candidate, ig)| PrunedChunk {
                retrieval_score: candidate.score,
                chunk: candidate.chunk,
                ig_score: ig.unwrap_or(f64::NEG_INFINITY),
                combined_score: None,
            })
            .collect();

        let mut ranked = self.apply_strategy(scored);
        rank(&mut ranked);

        let pruned_count = ranked.len();
        Ok(PruneOutcome {
            ranked_chunks: ranked,
            baseline_nu: baseline,
            chunks_processed,
            batches_used,
            duration_ms: started.elapsed().as_millis() as u64,
            original_count,
            pruned_count,
            pruning_ratio: ratio(original_count, pruned_count),
            cancelled,
            warnings,
        })
    }

    fn apply_strategy(&self, scored: Vec<PrunedChunk>) -> Vec<PrunedChunk> {
        match self.config.strategy {
            IgpStrategy::Threshold => scored
                .into_iter()
                .filter(|c| c.ig_score >= self.config.threshold)
                .collect(),
            IgpStrategy::TopK => {
                let mut all = scored;
                rank(&mut all);
                all.truncate(self.config.top_k);
                all
            }
            IgpStrategy::Combined => {
                let finite: Vec<f64> =
                    scored.iter().map(|c| c.ig_score).filter(|ig| ig.is_finite()).collect();
                let (ig_min, ig_max) = min_max(&finite);
                let retrieval: Vec<f64> =
                    scored.iter().map(|c| c.retrieval_score as f64).collect();
                let (r_min, r_max) = min_max(&retrieval);
                let gamma = self.config.ig_weight;

                scored
                    .into_iter()
                    .map(|mut c| {
                        let ig_norm = if c.ig_score.is_finite() {
                            unit(c.ig_score, ig_min, ig_max)
                        } else {
                            0.0
                        };
                        let r_norm = unit(c.retrieval_score as f64, r_min, r_max);
                        c.combined_score = Some(gamma * ig_norm + (1.0 - gamma) * r_norm);
                        c
                    })
                    .collect()
            }
        }
    }

    fn cancelled_outcome(
        &self,
        candidates: Vec<RetrievedChunk>,
        started: Instant,
        chunks_processed: usize,
        batches_used: usize,
        baseline: f64,
        warnings: Vec<Warning>,
    ) -> Result<PruneOutcome> {
        if self.config.on_cancel == CancelBehavior::Propagate {
            return Err(Error::Cancelled);
        }
        Ok(PruneOutcome {
            ranked_chunks: vec![],
            baseline_nu: baseline,
            chunks_processed,
            batches_used,
            duration_ms: started.elapsed().as_millis() as u64,
            original_count: candidates.len(),
            pruned_count: 0,
            pruning_ratio: ratio(candidates.len(), 0),
            cancelled: true,
            warnings,
        })
    }
}

/// Sort by the active ranking key descending, ties by ascending chunk id.
fn rank(chunks: &mut [PrunedChunk]) {
    chunks.sort_by(|a, b| {
        let ka = a.combined_score.unwrap_or(a.ig_score);
        let kb = b.combined_score.unwrap_or(b.ig_score);
        kb.total_cmp(&ka).then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

fn passthrough(
    candidates: Vec<RetrievedChunk>,
    started: Instant,
    warnings: Vec<Warning>,
) -> PruneOutcome {
    let original_count = candidates.len();
    let ranked_chunks: Vec<PrunedChunk> = candidates
        .into_iter()
        .map(|candidate| PrunedChunk {
            retrieval_score: candidate.score,
            chunk: candidate.chunk,
            ig_score: 0.0,
            combined_score: None,
        })
        .collect();
    PruneOutcome {
        pruned_count: ranked_chunks.len(),
        ranked_chunks,
        baseline_nu: 0.0,
        chunks_processed: 0,
        batches_used: 0,
        duration_ms: started.elapsed().as_millis() as u64,
        original_count,
        pruning_ratio: 0.0,
        cancelled: false,
        warnings,
    }
}

fn ratio(original: usize, kept: usize) -> f64 {
    if original == 0 {
        0.0
    } else {
        (original - kept) as f64 / original as f64
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    (min, max)
}

fn unit(value: f64, min: f64, max: f64) -> f64 {
    if !min.is_finite() || !max.is_finite() {
        return 0.0;
    }
    let span = max - min;
    if span > f64::EPSILON {
        (value - min) / span
    } else if max > 0.0 {
        1.0
    } else {
        0.0
    }
}
