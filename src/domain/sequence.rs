// ============================================================
// Layer 3 - Sequence Dataset
// ============================================================
// The trainer consumes windows that were built elsewhere:
// each sample is `window_length` consecutive feature rows
// paired with the target value that follows them.
//
// Invariants enforced by SequenceDataset::new:
//   - both partitions are non-empty
//   - every window holds exactly window_length × feature_count values
//   - every value and label is finite
//
// Windows are stored flat, row-major (time step, then feature).

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

use crate::domain::shape::InputShape;

/// One (window, label) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSample {
    pub window: Vec<f32>,
    pub label:  f32,
}

impl SequenceSample {
    pub fn new(window: Vec<f32>, label: f32) -> Self {
        Self { window, label }
    }
}

/// Disjoint train and test partitions sharing one window shape.
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    shape: InputShape,
    train: Vec<SequenceSample>,
    test:  Vec<SequenceSample>,
}

impl SequenceDataset {
    pub fn new(
        shape: InputShape,
        train: Vec<SequenceSample>,
        test:  Vec<SequenceSample>,
    ) -> Result<Self> {
        ensure!(
            shape.window_length > 0 && shape.feature_count > 0,
            "window shape must be non-empty, got ({}, {})",
            shape.window_length,
            shape.feature_count
        );
        ensure!(!train.is_empty(), "train partition is empty");
        ensure!(!test.is_empty(), "test partition is empty");
        check_partition("train", shape, &train)?;
        check_partition("test", shape, &test)?;
        Ok(Self { shape, train, test })
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn train(&self) -> &[SequenceSample] {
        &self.train
    }

    pub fn test(&self) -> &[SequenceSample] {
        &self.test
    }

    pub fn test_labels(&self) -> Vec<f32> {
        self.test.iter().map(|s| s.label).collect()
    }
}

fn check_partition(name: &str, shape: InputShape, samples: &[SequenceSample]) -> Result<()> {
    for (i, sample) in samples.iter().enumerate() {
        if sample.window.len() != shape.len() {
            bail!(
                "{name} window {i} has {} values, expected {} ({} × {})",
                sample.window.len(),
                shape.len(),
                shape.window_length,
                shape.feature_count
            );
        }
        if !sample.label.is_finite() || sample.window.iter().any(|v| !v.is_finite()) {
            bail!("{name} sample {i} contains a non-finite value");
        }
    }
    Ok(())
}
