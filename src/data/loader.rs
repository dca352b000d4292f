// ============================================================
// Layer 4 - Sequence File Loader
// ============================================================
// Reads the processed, already windowed dataset:
//
//   {
//     "x_train": [[[f; feature_count]; window_length]; n_train],
//     "y_train": [f; n_train],
//     "x_test":  [[[f; feature_count]; window_length]; n_test],
//     "y_test":  [f; n_test]
//   }
//
// Labels may also be written as one-element arrays ([[f], ...]),
// which is how column vectors usually get exported.
//
// The window shape is not configured anywhere: it is taken
// from the first training window, and every other window in
// both partitions must match it exactly.

use std::{fs, path::PathBuf};

use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;

use crate::domain::sequence::{SequenceDataset, SequenceSample};
use crate::domain::shape::InputShape;
use crate::domain::traits::SequenceProvider;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Label {
    Scalar(f32),
    Column([f32; 1]),
}

impl Label {
    fn value(&self) -> f32 {
        match self {
            Label::Scalar(v) => *v,
            Label::Column([v]) => *v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SequenceFile {
    x_train: Vec<Vec<Vec<f32>>>,
    y_train: Vec<Label>,
    x_test:  Vec<Vec<Vec<f32>>>,
    y_test:  Vec<Label>,
}

/// Loads a windowed train/test dataset from one JSON file.
/// Implements the SequenceProvider trait from Layer 3.
pub struct SequenceFileLoader {
    path: PathBuf,
}

impl SequenceFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SequenceProvider for SequenceFileLoader {
    fn load(&self) -> Result<SequenceDataset> {
        let raw = fs::read(&self.path)
            .with_context(|| format!("Cannot read dataset '{}'", self.path.display()))?;
        let file: SequenceFile = serde_json::from_slice(&raw)
            .with_context(|| format!("'{}' is not a windowed dataset", self.path.display()))?;

        let shape = infer_shape(&file.x_train)?;
        let train = to_samples("train", shape, file.x_train, &file.y_train)?;
        let test  = to_samples("test", shape, file.x_test, &file.y_test)?;

        tracing::info!(
            "Loaded {} train / {} test windows of shape ({}, {}) from '{}'",
            train.len(),
            test.len(),
            shape.window_length,
            shape.feature_count,
            self.path.display()
        );
        SequenceDataset::new(shape, train, test)
    }
}

fn infer_shape(windows: &[Vec<Vec<f32>>]) -> Result<InputShape> {
    let first = windows.first().context("x_train holds no windows")?;
    let feature_count = first.first().map(Vec::len).unwrap_or(0);
    Ok(InputShape::new(first.len(), feature_count))
}

fn to_samples(
    partition: &str,
    shape:     InputShape,
    windows:   Vec<Vec<Vec<f32>>>,
    labels:    &[Label],
) -> Result<Vec<SequenceSample>> {
    ensure!(
        windows.len() == labels.len(),
        "{partition}: {} windows but {} labels",
        windows.len(),
        labels.len()
    );

    let mut samples = Vec::with_capacity(windows.len());
    for (i, (window, label)) in windows.into_iter().zip(labels).enumerate() {
        if window.len() != shape.window_length
            || window.iter().any(|row| row.len() != shape.feature_count)
        {
            bail!(
                "{partition} window {i} does not have shape ({}, {})",
                shape.window_length,
                shape.feature_count
            );
        }
        let flat = window.into_iter().flatten().collect();
        samples.push(SequenceSample::new(flat, label.value()));
    }
    Ok(samples)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(value: serde_json::Value) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequences.json");
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_infers_shape() {
        let (_dir, path) = write(json!({
            "x_train": [[[1, 2, 3], [4, 5, 6]], [[7, 8, 9], [10, 11, 12]]],
            "y_train": [0.5, 0.6],
            "x_test":  [[[1, 1, 1], [2, 2, 2]]],
            "y_test":  [[0.7]]
        }));

        let ds = SequenceFileLoader::new(path).load().unwrap();
        assert_eq!(ds.shape(), InputShape::new(2, 3));
        assert_eq!(ds.train().len(), 2);
        assert_eq!(ds.train()[1].window, vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        assert_eq!(ds.test_labels(), vec![0.7]);
    }

    #[test]
    fn test_inconsistent_window_is_rejected() {
        let (_dir, path) = write(json!({
            "x_train": [[[1, 2], [3, 4]]],
            "y_train": [1.0],
            "x_test":  [[[1, 2], [3]]],
            "y_test":  [1.0]
        }));
        let err = SequenceFileLoader::new(path).load().unwrap_err();
        assert!(err.to_string().contains("test window 0"));
    }

    #[test]
    fn test_label_count_mismatch() {
        let (_dir, path) = write(json!({
            "x_train": [[[1.0]]],
            "y_train": [1.0, 2.0],
            "x_test":  [[[1.0]]],
            "y_test":  [1.0]
        }));
        assert!(SequenceFileLoader::new(path).load().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SequenceFileLoader::new("/nonexistent/seq.json").load().unwrap_err();
        assert!(err.to_string().contains("Cannot read dataset"));
    }
}
