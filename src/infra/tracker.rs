// ============================================================
// Layer 6 - Experiment Tracker
// ============================================================
// Every run of a sweep (completed or failed) is appended as
// one JSON line to the experiment's log:
//
//   <tracking_dir>/
//     <experiment-slug>/
//       runs.jsonl            ← one TrainingRunRecord per line
//       train_config.json     ← effective config of the last session
//       <run_id>/model.bin    ← each completed run's model
//
// The log is append-only: the file is opened with append=true
// and nothing in this crate rewrites or truncates it. Each
// line is flushed before record() returns.
//
// Reading the log back (read_runs) is for the `runs` command
// and for audits; the serving path never touches it.

use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::run_record::TrainingRunRecord;
use crate::domain::traits::ExperimentTracker;
use crate::infra::artifact::write_atomic;

pub const RUNS_FILE: &str = "runs.jsonl";

/// Directory-name form of an experiment name: `LSTM Pollution Prediction`
/// becomes `lstm-pollution-prediction`.
pub fn experiment_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() { "default".to_string() } else { slug }
}

/// File-backed tracker writing JSON lines.
pub struct JsonlTracker {
    dir:      PathBuf,
    log_path: PathBuf,
}

impl JsonlTracker {
    /// Open (or create) the log for `experiment` under `root`.
    pub fn open(root: impl AsRef<Path>, experiment: &str) -> Result<Self> {
        let dir = root.as_ref().join(experiment_slug(experiment));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create tracking directory '{}'", dir.display()))?;

        let log_path = dir.join(RUNS_FILE);
        tracing::debug!("Tracking runs in '{}'", log_path.display());
        Ok(Self { dir, log_path })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Store a pretty-printed JSON snapshot next to the log.
    pub fn save_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &json)?;
        Ok(path)
    }
}

impl ExperimentTracker for JsonlTracker {
    fn record(&mut self, run: &TrainingRunRecord) -> Result<()> {
        let mut line = serde_json::to_string(run)?;
        line.push('\n');

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Cannot open run log '{}'", self.log_path.display()))?;
        f.write_all(line.as_bytes())?;
        f.flush()?;

        tracing::debug!("Logged run {} ({:?})", run.run_number, run.status);
        Ok(())
    }

    fn log_model(&mut self, run_id: &str, bytes: &[u8]) -> Result<String> {
        let path = self.dir.join(run_id).join("model.bin");
        write_atomic(&path, bytes)
            .with_context(|| format!("Cannot store run model '{}'", path.display()))?;
        Ok(path.display().to_string())
    }
}

/// Read every record of a run log, in append order.
pub fn read_runs(log_path: &Path) -> Result<Vec<TrainingRunRecord>> {
    let f = fs::File::open(log_path)
        .with_context(|| format!("Cannot open run log '{}'", log_path.display()))?;

    let mut runs = Vec::new();
    for (i, line) in BufReader::new(f).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run = serde_json::from_str(&line)
            .with_context(|| format!("{}:{} is not a run record", log_path.display(), i + 1))?;
        runs.push(run);
    }
    Ok(runs)
}

/// In-memory tracker, used where nothing should touch the disk.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    pub runs:   Vec<TrainingRunRecord>,
    pub models: Vec<(String, usize)>,
}

impl ExperimentTracker for MemoryTracker {
    fn record(&mut self, run: &TrainingRunRecord) -> Result<()> {
        self.runs.push(run.clone());
        Ok(())
    }

    fn log_model(&mut self, run_id: &str, bytes: &[u8]) -> Result<String> {
        self.models.push((run_id.to_string(), bytes.len()));
        Ok(format!("memory://{run_id}"))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hyperparams::HyperparameterSpace;
    use crate::domain::run_record::{RunMetrics, RunStatus};

    fn run(run_number: usize, rmse: Option<f64>) -> TrainingRunRecord {
        TrainingRunRecord {
            run_id:      format!("run-{run_number}"),
            session_id:  "session".into(),
            experiment:  "LSTM Pollution Prediction".into(),
            run_number,
            combination: HyperparameterSpace::default().combinations()[run_number - 1],
            status:      if rmse.is_some() { RunStatus::Completed } else { RunStatus::Failed },
            metrics:     rmse.map(|rmse| RunMetrics { rmse, mae: rmse / 2.0, r2: 0.5 }),
            artifact:    None,
            promoted:    false,
            error:       rmse.is_none().then(|| "loss diverged".to_string()),
            timestamp:   chrono::Utc::now(),
        }
    }

    #[test]
    fn test_slug() {
        assert_eq!(experiment_slug("LSTM Pollution Prediction"), "lstm-pollution-prediction");
        assert_eq!(experiment_slug("  a//b  "), "a-b");
        assert_eq!(experiment_slug("???"), "default");
    }

    #[test]
    fn test_records_append_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let mut tracker = JsonlTracker::open(dir.path(), "LSTM Pollution Prediction").unwrap();
        tracker.record(&run(1, Some(0.9))).unwrap();
        tracker.record(&run(2, None)).unwrap();

        // A second session appends to the same log
        let mut tracker = JsonlTracker::open(dir.path(), "LSTM Pollution Prediction").unwrap();
        tracker.record(&run(3, Some(0.4))).unwrap();

        let runs = read_runs(tracker.log_path()).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].run_id, "run-1");
        assert_eq!(runs[0].combination, run(1, None).combination);
        assert_eq!(runs[1].status, RunStatus::Failed);
        assert_eq!(runs[2].rmse(), Some(0.4));
    }

    #[test]
    fn test_log_model_stores_bytes_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = JsonlTracker::open(dir.path(), "exp").unwrap();
        let reference = tracker.log_model("abc", &[1, 2, 3]).unwrap();
        assert_eq!(fs::read(&reference).unwrap(), vec![1, 2, 3]);
        assert!(reference.ends_with("model.bin"));
    }
}
