//! Information-gain pruning: the normalized-uncertainty calculator and the
//! batched candidate pruner built on it.

pub mod nu;
pub mod pruner;

pub use nu::{normalized_uncertainty, NuCalculator, NuResult, UncertaintyProbe};
pub use pruner::{IgPruner, PruneOutcome, PrunedChunk};
