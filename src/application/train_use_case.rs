// ============================================================
// Layer 2 - TrainUseCase
// ============================================================
// Orchestrates one training session:
//
//   Step 1: Validate the hyperparameter space  (Layer 3 - domain)
//   Step 2: Load the windowed dataset          (Layer 4 - data)
//   Step 3: Open the experiment tracker        (Layer 6 - infra)
//   Step 4: Save the effective config          (Layer 6 - infra)
//   Step 5: Sweep every combination            (Layer 2 + Layer 5)
//
// If the tracking directory cannot be opened the session still
// runs against an in-memory tracker; only the promoted
// artifact is required to land on disk.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::application::session::{SweepReport, TrainingSession};
use crate::data::loader::SequenceFileLoader;
use crate::domain::hyperparams::HyperparameterSpace;
use crate::domain::traits::{ExperimentTracker, SequenceProvider};
use crate::infra::artifact::ArtifactStore;
use crate::infra::tracker::{JsonlTracker, MemoryTracker};
use crate::ml::trainer::{BurnFitter, DEFAULT_LEARNING_RATE, DEFAULT_SEED};

pub const DEFAULT_EXPERIMENT: &str = "LSTM Pollution Prediction";
pub const DEFAULT_ARTIFACT_PATH: &str = "models/best_lstm_model.bin";
pub const CONFIG_FILE: &str = "train_config.json";

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a session depends on. Saved next to the run log
// so a sweep can be repeated exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_path:     String,
    pub artifact_path: String,
    pub tracking_dir:  String,
    pub experiment:    String,
    pub space:         HyperparameterSpace,
    pub learning_rate: f64,
    pub seed:          u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:     "data/sequences.json".to_string(),
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
            tracking_dir:  "mlruns".to_string(),
            experiment:    DEFAULT_EXPERIMENT.to_string(),
            space:         HyperparameterSpace::default(),
            learning_rate: DEFAULT_LEARNING_RATE,
            seed:          DEFAULT_SEED,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<SweepReport> {
        let cfg = &self.config;

        // ── Step 1: Reject a bad grid before loading anything ────────────────
        cfg.space.validate()?;
        tracing::info!(
            "Grid: {} combinations (units {:?}, dropout {:?}, batch {:?}, epochs {:?})",
            cfg.space.cardinality(),
            cfg.space.hidden_units,
            cfg.space.dropout_rates,
            cfg.space.batch_sizes,
            cfg.space.epoch_counts
        );

        // ── Step 2: Load windows ──────────────────────────────────────────────
        let dataset = SequenceFileLoader::new(&cfg.data_path).load()?;

        // ── Step 3 + 4: Tracker and config snapshot ───────────────────────────
        let tracker: Box<dyn ExperimentTracker> =
            match JsonlTracker::open(&cfg.tracking_dir, &cfg.experiment) {
                Ok(tracker) => {
                    tracing::info!("Tracking runs in '{}'", tracker.log_path().display());
                    match tracker.save_json(CONFIG_FILE, cfg) {
                        Ok(path) => tracing::info!("Config saved to '{}'", path.display()),
                        Err(e) => tracing::warn!("Could not save training config: {e:#}"),
                    }
                    Box::new(tracker)
                }
                Err(e) => {
                    tracing::warn!("Experiment tracking unavailable, runs are kept in memory only: {e:#}");
                    Box::new(MemoryTracker::default())
                }
            };

        // ── Step 5: Sweep ─────────────────────────────────────────────────────
        let fitter = BurnFitter::new(cfg.learning_rate, cfg.seed);
        let store = ArtifactStore::new(&cfg.artifact_path);
        let mut session = TrainingSession::new(&cfg.experiment, fitter, tracker, store);
        let report = session.run(&cfg.space, &dataset)?;

        if report.completed() == 0 {
            bail!(
                "All {} runs failed; no model was promoted to '{}'",
                report.records.len(),
                cfg.artifact_path
            );
        }
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::artifact::ModelArtifact;
    use crate::infra::tracker::{experiment_slug, read_runs, RUNS_FILE};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use serde_json::json;
    use std::{fs, path::Path};

    fn write_dataset(path: &Path) {
        let mut rng = StdRng::seed_from_u64(3);
        let mut windows = |n: usize| -> (Vec<Vec<Vec<f32>>>, Vec<f32>) {
            let x: Vec<Vec<Vec<f32>>> = (0..n)
                .map(|_| (0..5).map(|_| (0..5).map(|_| rng.gen_range(0.0..1.0)).collect()).collect())
                .collect();
            let y = x.iter().map(|w: &Vec<Vec<f32>>| w[4][3]).collect();
            (x, y)
        };
        let (x_train, y_train) = windows(24);
        let (x_test, y_test) = windows(6);
        let body = json!({ "x_train": x_train, "y_train": y_train, "x_test": x_test, "y_test": y_test });
        fs::write(path, serde_json::to_vec(&body).unwrap()).unwrap();
    }

    #[test]
    fn test_execute_small_grid_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("sequences.json");
        write_dataset(&data_path);

        let config = TrainConfig {
            data_path:     data_path.display().to_string(),
            artifact_path: dir.path().join("models/best.bin").display().to_string(),
            tracking_dir:  dir.path().join("mlruns").display().to_string(),
            space: HyperparameterSpace {
                hidden_units:  vec![4, 8],
                dropout_rates: vec![0.2],
                batch_sizes:   vec![8],
                epoch_counts:  vec![1],
            },
            ..TrainConfig::default()
        };

        let report = TrainUseCase::new(config.clone()).execute().unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.completed(), 2);
        assert_eq!(report.promoted_runs()[0], 1);

        let artifact = ModelArtifact::from_bytes(&fs::read(&config.artifact_path).unwrap()).unwrap();
        let stored = artifact.header.metrics.unwrap().rmse;
        assert!((stored - report.best.rmse().unwrap()).abs() < 1e-9);

        let log_dir = Path::new(&config.tracking_dir).join(experiment_slug(&config.experiment));
        assert_eq!(read_runs(&log_dir.join(RUNS_FILE)).unwrap().len(), 2);
        assert!(log_dir.join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_invalid_grid_fails_before_reading_data() {
        let config = TrainConfig {
            data_path: "/nonexistent/sequences.json".into(),
            space: HyperparameterSpace { dropout_rates: vec![1.5], ..HyperparameterSpace::default() },
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(config).execute().unwrap_err();
        assert!(!err.to_string().contains("Cannot read dataset"));
    }
}
