// ============================================================
// Layer 2 - Training Session
// ============================================================
// One sweep over the hyperparameter space, identified by a
// session UUID. For every combination, in enumeration order:
//
//   fit ──▶ score on test partition ──▶ serialize
//                                           │
//            ┌──────────────────────────────┤
//            ▼                              ▼
//   tracker.log_model              promoter.consider
//            │                              │
//            └──────────▶ tracker.record ◀──┘
//
// Fault isolation: anything that goes wrong while fitting or
// scoring one combination (error or panic) becomes a Failed
// record and the sweep moves on. Tracker errors are logged
// and ignored. A failed promotion write ends the session,
// since the disk the served model lives on is in trouble.

use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::application::promoter::{BestScore, Candidate, Promoter};
use crate::domain::hyperparams::{HyperparameterCombination, HyperparameterSpace};
use crate::domain::run_record::{RunMetrics, RunStatus, TrainingRunRecord};
use crate::domain::sequence::SequenceDataset;
use crate::domain::traits::{CombinationFitter, ExperimentTracker, Persistable};
use crate::infra::artifact::ArtifactStore;

/// What a finished sweep produced.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub session_id: Uuid,
    pub records:    Vec<TrainingRunRecord>,
    pub best:       BestScore,
}

impl SweepReport {
    pub fn completed(&self) -> usize {
        self.records.iter().filter(|r| r.status == RunStatus::Completed).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.completed()
    }

    pub fn promoted_runs(&self) -> Vec<usize> {
        self.records.iter().filter(|r| r.promoted).map(|r| r.run_number).collect()
    }
}

pub struct TrainingSession<F, T> {
    experiment: String,
    session_id: Uuid,
    fitter:     F,
    tracker:    T,
    promoter:   Promoter,
}

impl<F: CombinationFitter, T: ExperimentTracker> TrainingSession<F, T> {
    pub fn new(experiment: impl Into<String>, fitter: F, tracker: T, store: ArtifactStore) -> Self {
        Self {
            experiment: experiment.into(),
            session_id: Uuid::new_v4(),
            fitter,
            tracker,
            promoter: Promoter::new(store),
        }
    }

    /// Train and evaluate every combination of `space` exactly once.
    pub fn run(&mut self, space: &HyperparameterSpace, dataset: &SequenceDataset) -> Result<SweepReport> {
        space.validate()?;
        let combinations = space.combinations();
        let total = combinations.len();
        tracing::info!(
            "Session {} | experiment '{}' | {} combinations",
            self.session_id,
            self.experiment,
            total
        );

        let mut records = Vec::with_capacity(total);
        for (i, combination) in combinations.iter().enumerate() {
            let run_number = i + 1;
            tracing::info!("Run {run_number}/{total} | {combination}");
            let record = self.run_one(run_number, combination, dataset)?;
            records.push(record);
        }

        let report = SweepReport {
            session_id: self.session_id,
            records,
            best: self.promoter.best().clone(),
        };
        tracing::info!(
            "Session {} finished: {} completed, {} failed, promoted runs {:?}",
            self.session_id,
            report.completed(),
            report.failed(),
            report.promoted_runs()
        );
        Ok(report)
    }

    fn run_one(
        &mut self,
        run_number:  usize,
        combination: &HyperparameterCombination,
        dataset:     &SequenceDataset,
    ) -> Result<TrainingRunRecord> {
        let run_id = Uuid::new_v4().to_string();
        let mut record = TrainingRunRecord {
            run_id:      run_id.clone(),
            session_id:  self.session_id.to_string(),
            experiment:  self.experiment.clone(),
            run_number,
            combination: *combination,
            status:      RunStatus::Failed,
            metrics:     None,
            artifact:    None,
            promoted:    false,
            error:       None,
            timestamp:   Utc::now(),
        };

        let (metrics, bytes) = match self.fit_and_score(combination, dataset) {
            Ok(scored) => scored,
            Err(e) => {
                tracing::warn!("Run {run_number} failed | {combination} | {e:#}");
                record.error = Some(format!("{e:#}"));
                self.track(&record);
                return Ok(record);
            }
        };

        record.status  = RunStatus::Completed;
        record.metrics = Some(metrics);
        tracing::info!(
            "Run {run_number} | rmse={:.6} | mae={:.6} | r2={:.4}",
            metrics.rmse,
            metrics.mae,
            metrics.r2
        );

        match self.tracker.log_model(&run_id, &bytes) {
            Ok(reference) => record.artifact = Some(reference),
            Err(e) => tracing::warn!("Could not log model of run {run_number}: {e:#}"),
        }

        let promotion = self.promoter.consider(Candidate {
            run_number,
            run_id: &run_id,
            combination: *combination,
            rmse: metrics.rmse,
            artifact: &bytes,
        });
        match promotion {
            Ok(promoted) => record.promoted = promoted,
            Err(e) => {
                record.error = Some(format!("promotion failed: {e:#}"));
                self.track(&record);
                return Err(e.context(format!("Session aborted at run {run_number}")));
            }
        }

        self.track(&record);
        Ok(record)
    }

    fn fit_and_score(
        &self,
        combination: &HyperparameterCombination,
        dataset:     &SequenceDataset,
    ) -> Result<(RunMetrics, Vec<u8>)> {
        let fitted = panic::catch_unwind(AssertUnwindSafe(|| self.fitter.fit(combination, dataset)))
            .map_err(|payload| anyhow!("training panicked: {}", panic_message(&*payload)))??;

        let metrics = RunMetrics::evaluate(&fitted.predictions, &dataset.test_labels())?;
        let bytes = fitted.model.to_artifact_bytes(&metrics)?;
        Ok((metrics, bytes))
    }

    fn track(&mut self, record: &TrainingRunRecord) {
        if let Err(e) = self.tracker.record(record) {
            tracing::warn!("Could not track run {}: {e:#}", record.run_number);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
