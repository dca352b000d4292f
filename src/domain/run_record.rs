// ============================================================
// Layer 3 - Run Metrics and Training Run Record
// ============================================================
// One TrainingRunRecord is produced per evaluated combination
// and handed to the experiment tracker. Records are built
// once and never mutated afterwards.
//
// Metrics are computed elementwise over every (prediction,
// label) pair of the held-out partition:
//
//   RMSE = sqrt(mean((y - ŷ)²))
//   MAE  = mean(|y - ŷ|)
//   R²   = 1 - SS_res / SS_tot
//
// RMSE is the primary metric; MAE and R² are recorded only.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::hyperparams::HyperparameterCombination;

/// Held-out evaluation metrics for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub rmse: f64,
    pub mae:  f64,
    pub r2:   f64,
}

impl RunMetrics {
    /// Compute RMSE, MAE and R² over paired predictions and labels.
    ///
    /// When every label is identical SS_tot is zero; R² is then 1.0
    /// for a perfect fit and 0.0 otherwise.
    pub fn evaluate(predictions: &[f32], labels: &[f32]) -> Result<Self> {
        if predictions.len() != labels.len() {
            bail!(
                "got {} predictions for {} labels",
                predictions.len(),
                labels.len()
            );
        }
        if labels.is_empty() {
            bail!("cannot evaluate an empty test partition");
        }

        let n = labels.len() as f64;
        let mean_label = labels.iter().map(|&y| y as f64).sum::<f64>() / n;

        let mut ss_res  = 0.0f64;
        let mut abs_sum = 0.0f64;
        let mut ss_tot  = 0.0f64;
        for (&p, &y) in predictions.iter().zip(labels) {
            let (p, y) = (p as f64, y as f64);
            let err = y - p;
            ss_res  += err * err;
            abs_sum += err.abs();
            ss_tot  += (y - mean_label) * (y - mean_label);
        }

        let rmse = (ss_res / n).sqrt();
        let mae  = abs_sum / n;
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        if !rmse.is_finite() || !mae.is_finite() {
            bail!("metrics are not finite (rmse={rmse}, mae={mae})");
        }
        Ok(Self { rmse, mae, r2 })
    }
}

/// Whether a run produced a model or was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Everything the tracker keeps about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRunRecord {
    pub run_id:      String,
    pub session_id:  String,
    pub experiment:  String,
    /// 1-based position in the enumeration order
    pub run_number:  usize,
    pub combination: HyperparameterCombination,
    pub status:      RunStatus,
    pub metrics:     Option<RunMetrics>,
    /// Where this run's serialized model was logged, if anywhere
    pub artifact:    Option<String>,
    pub promoted:    bool,
    pub error:       Option<String>,
    pub timestamp:   DateTime<Utc>,
}

impl TrainingRunRecord {
    pub fn rmse(&self) -> Option<f64> {
        self.metrics.map(|m| m.rmse)
    }
}
