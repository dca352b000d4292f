// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// The training session is written against these traits, not
// against Burn or the filesystem:
//
//   SequenceProvider   → where windows come from
//                        (SequenceFileLoader)
//   CombinationFitter  → how one combination is trained
//                        (BurnFitter)
//   Persistable        → how a fitted model becomes artifact bytes
//                        (LstmArtifactModel)
//   ExperimentTracker  → where run records go
//                        (JsonlTracker, MemoryTracker)
//
// Tests swap in small fakes for each of them.

use anyhow::Result;

use crate::domain::hyperparams::HyperparameterCombination;
use crate::domain::run_record::{RunMetrics, TrainingRunRecord};
use crate::domain::sequence::SequenceDataset;

// ─── SequenceProvider ─────────────────────────────────────────────────────────
/// Anything that can produce a windowed train/test dataset.
pub trait SequenceProvider {
    fn load(&self) -> Result<SequenceDataset>;
}

// ─── Persistable ──────────────────────────────────────────────────────────────
/// A trained model that can be written as a self-describing artifact.
pub trait Persistable {
    /// Serialize architecture and weights, embedding the run's metrics.
    fn to_artifact_bytes(&self, metrics: &RunMetrics) -> Result<Vec<u8>>;
}

/// Output of fitting one combination: the model plus its
/// predictions over the whole test partition, in order.
#[derive(Debug)]
pub struct FittedModel<M> {
    pub model:       M,
    pub predictions: Vec<f32>,
}

// ─── CombinationFitter ────────────────────────────────────────────────────────
/// Builds and trains a fresh model for one hyperparameter combination.
pub trait CombinationFitter {
    type Model: Persistable;

    fn fit(
        &self,
        combination: &HyperparameterCombination,
        dataset:     &SequenceDataset,
    ) -> Result<FittedModel<Self::Model>>;
}

// ─── ExperimentTracker ────────────────────────────────────────────────────────
/// Append-only sink for run records. There is no delete or update.
pub trait ExperimentTracker {
    /// Append one record. Must accept failed and degenerate runs alike.
    fn record(&mut self, run: &TrainingRunRecord) -> Result<()>;

    /// Keep a copy of a run's serialized model; returns a reference to it.
    fn log_model(&mut self, run_id: &str, bytes: &[u8]) -> Result<String>;
}

impl<T: ExperimentTracker + ?Sized> ExperimentTracker for Box<T> {
    fn record(&mut self, run: &TrainingRunRecord) -> Result<()> {
        (**self).record(run)
    }

    fn log_model(&mut self, run_id: &str, bytes: &[u8]) -> Result<String> {
        (**self).log_model(run_id, bytes)
    }
}
