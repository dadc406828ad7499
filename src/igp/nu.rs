//! Normalized uncertainty (NU)
//!
//! Probes the completion endpoint with `top_logprobs` enabled and turns
//! the per-token top-K distributions into a single [0,1] uncertainty
//! number: per-token entropy normalized against `log(topK)`, averaged
//! over the generated prefix.

use crate::config::NuConfig;
use crate::domain::error::Result;
use crate::domain::ports::{CompletionClient, CompletionRequest, TokenTopLogprobs};
use crate::providers::llm::RetryPolicy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Result of one uncertainty probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NuResult {
    /// Normalized uncertainty in [0,1]
    pub nu: f64,
    /// Generated tokens the average ran over
    pub tokens_seen: usize,
    /// Wall-clock of the probe in milliseconds
    pub duration_ms: u64,
}

/// Anything that can measure prompt uncertainty.
///
/// The production implementation is [`NuCalculator`]; tests script this
/// trait to rig exact NU values per prompt.
#[async_trait]
pub trait UncertaintyProbe: Send + Sync {
    /// Measure the normalized uncertainty of completing `prompt`.
    async fn measure(&self, prompt: &str) -> Result<NuResult>;

    /// Whether the underlying provider can return `top_logprobs`.
    fn supports_logprobs(&self) -> bool;
}

/// Computes NU from live completion calls.
pub struct NuCalculator {
    client: Arc<dyn CompletionClient>,
    config: NuConfig,
    retry: RetryPolicy,
}

impl NuCalculator {
    /// Create a calculator over a completion client.
    pub fn new(client: Arc<dyn CompletionClient>, config: NuConfig, retry: RetryPolicy) -> Self {
        Self { client, config, retry }
    }
}

#[async_trait]
impl UncertaintyProbe for NuCalculator {
    async fn measure(&self, prompt: &str) -> Result<NuResult> {
        let started = Instant::now();
        let completion = self
            .retry
            .run(|| {
                self.client.complete(CompletionRequest {
                    prompt: prompt.to_string(),
                    max_tokens: self.config.max_tokens,
                    temperature: 0.0,
                    top_logprobs: Some(self.config.top_k),
                })
            })
            .await?;

        let logprobs = completion.logprobs.unwrap_or_default();
        let (nu, tokens_seen) = normalized_uncertainty(&logprobs, self.config.top_k as usize);
        Ok(NuResult { nu, tokens_seen, duration_ms: started.elapsed().as_millis() as u64 })
    }

    fn supports_logprobs(&self) -> bool {
        self.client.supports_logprobs()
    }
}

/// Mean normalized per-token entropy over a generated prefix.
///
/// Per token: convert the top-K log-probabilities to probabilities,
/// renormalize to sum 1 (provider tails may be clipped), take
/// `H = −Σ p·ln p`, and normalize by `ln(topK)`. Zero generated tokens
/// yield NU 0.
pub fn normalized_uncertainty(tokens: &[TokenTopLogprobs], top_k: usize) -> (f64, usize) {
    if tokens.is_empty() || top_k < 2 {
        return (0.0, 0);
    }
    let h_max = (top_k as f64).ln();
    let mut total = 0.0f64;
    let mut counted = 0usize;

    for token in tokens {
        if token.logprobs.is_empty() {
            continue;
        }
        let mut probs: Vec<f64> = token.logprobs.iter().map(|lp| lp.exp()).collect();
        let sum: f64 = probs.iter().sum();
        if sum <= 0.0 {
            continue;
        }
        for p in &mut probs {
            *p /= sum;
        }
        let entropy: f64 = probs
            .iter()
            .filter(|p| **p > 0.0)
            .map(|p| -p * p.ln())
            .sum();
        total += (entropy / h_max).clamp(0.0, 1.0);
        counted += 1;
    }

    if counted == 0 {
        (0.0, 0)
    } else {
        (total / counted as f64, counted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(probs: &[f64]) -> TokenTopLogprobs {
        TokenTopLogprobs {
            token: "t".into(),
            logprobs: probs.iter().map(|p| p.ln()).collect(),
        }
    }

    #[test]
    fn uniform_distribution_is_maximally_uncertain() {
        let tokens = vec![token(&[0.2, 0.2, 0.2, 0.2, 0.2])];
        let (nu, seen) = normalized_uncertainty(&tokens, 5);
        assert!((nu - 1.0).abs() < 1e-9);
        assert_eq!(seen, 1);
    }

    #[test]
    fn peaked_distribution_matches_closed_form() {
        let probs = [0.9, 0.05, 0.03, 0.01, 0.01];
        let tokens = vec![token(&probs)];
        let (nu, _) = normalized_uncertainty(&tokens, 5);
        // H = −Σ p·ln p over the given distribution, normalized by ln 5.
        let expected: f64 =
            probs.iter().map(|p| -p * p.ln()).sum::<f64>() / 5f64.ln();
        assert!((nu - expected).abs() < 1e-6);
        assert!((nu - 0.274575).abs() < 1e-4);
    }

    #[test]
    fn zero_tokens_means_zero_uncertainty() {
        let (nu, seen) = normalized_uncertainty(&[], 5);
        assert_eq!(nu, 0.0);
        assert_eq!(seen, 0);
    }

    #[test]
    fn clipped_distributions_are_renormalized() {
        // Provider dropped mass: probabilities sum to 0.5.
        let tokens = vec![TokenTopLogprobs {
            token: "t".into(),
            logprobs: vec![0.25f64.ln(), 0.25f64.ln()],
        }];
        let (nu, _) = normalized_uncertainty(&tokens, 2);
        // After renormalization this is uniform over two outcomes.
        assert!((nu - 1.0).abs() < 1e-9);
    }

    #[test]
    fn averaging_runs_over_all_tokens() {
        let tokens = vec![
            token(&[0.2, 0.2, 0.2, 0.2, 0.2]), // NU 1.0
            token(&[1.0, 1e-12, 1e-12, 1e-12, 1e-12]), // NU ≈ 0
        ];
        let (nu, seen) = normalized_uncertainty(&tokens, 5);
        assert_eq!(seen, 2);
        assert!((nu - 0.5).abs() < 1e-3);
    }
}
