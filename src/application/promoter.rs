// ============================================================
// Layer 2 - Model Promoter
// ============================================================
// Keeps the best score seen in THIS session and decides, run
// by run, whether the new model replaces the served one.
//
//   NoBestYet ──(first completed run)──────────────▶ HasBest
//   HasBest   ──(rmse strictly below best)─────────▶ HasBest
//   HasBest   ──(rmse equal or above, or NaN)──────▶ unchanged
//
// The artifact write finishes (fsync + rename) before
// consider() reports a promotion. If the write fails the best
// score is left untouched and the error goes to the caller.

use anyhow::Result;

use crate::domain::hyperparams::HyperparameterCombination;
use crate::infra::artifact::ArtifactStore;

/// Best-Score State of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum BestScore {
    NoBestYet,
    HasBest {
        rmse:        f64,
        combination: HyperparameterCombination,
        run_number:  usize,
        run_id:      String,
    },
}

impl BestScore {
    /// Whether a run scoring `rmse` would take over.
    pub fn is_beaten_by(&self, rmse: f64) -> bool {
        if !rmse.is_finite() {
            return false;
        }
        match self {
            BestScore::NoBestYet => true,
            BestScore::HasBest { rmse: best, .. } => rmse < *best,
        }
    }

    pub fn rmse(&self) -> Option<f64> {
        match self {
            BestScore::NoBestYet => None,
            BestScore::HasBest { rmse, .. } => Some(*rmse),
        }
    }
}

/// A completed run offered for promotion.
#[derive(Debug)]
pub struct Candidate<'a> {
    pub run_number:  usize,
    pub run_id:      &'a str,
    pub combination: HyperparameterCombination,
    pub rmse:        f64,
    pub artifact:    &'a [u8],
}

pub struct Promoter {
    store: ArtifactStore,
    best:  BestScore,
}

impl Promoter {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store, best: BestScore::NoBestYet }
    }

    pub fn best(&self) -> &BestScore {
        &self.best
    }

    /// Returns true when the candidate became the promoted model.
    pub fn consider(&mut self, candidate: Candidate<'_>) -> Result<bool> {
        if !self.best.is_beaten_by(candidate.rmse) {
            return Ok(false);
        }

        self.store.replace(candidate.artifact)?;

        match self.best.rmse() {
            Some(previous) => tracing::info!(
                "Run {} promoted: rmse {:.6} < {:.6}",
                candidate.run_number,
                candidate.rmse,
                previous
            ),
            None => tracing::info!(
                "Run {} promoted: first completed run (rmse {:.6})",
                candidate.run_number,
                candidate.rmse
            ),
        }

        self.best = BestScore::HasBest {
            rmse:        candidate.rmse,
            combination: candidate.combination,
            run_number:  candidate.run_number,
            run_id:      candidate.run_id.to_string(),
        };
        Ok(true)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hyperparams::HyperparameterSpace;
    use std::fs;

    fn offer(promoter: &mut Promoter, run_number: usize, rmse: f64) -> bool {
        let combination = HyperparameterSpace::default().combinations()[run_number - 1];
        let run_id = format!("run-{run_number}");
        let bytes = format!("model of run {run_number}");
        let promoted = promoter
            .consider(Candidate {
                run_number,
                run_id: &run_id,
                combination,
                rmse,
                artifact: bytes.as_bytes(),
            })
            .unwrap();
        promoted
    }

    #[test]
    fn test_promotion_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("best_lstm_model.bin");
        let mut promoter = Promoter::new(ArtifactStore::new(&path));

        let promoted: Vec<usize> = [0.9, 0.7, 0.7, 0.5, 0.6]
            .iter()
            .enumerate()
            .filter(|&(i, &rmse)| offer(&mut promoter, i + 1, rmse))
            .map(|(i, _)| i + 1)
            .collect();

        assert_eq!(promoted, vec![1, 2, 4]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "model of run 4");
        assert_eq!(promoter.best().rmse(), Some(0.5));
        match promoter.best() {
            BestScore::HasBest { run_number, run_id, .. } => {
                assert_eq!(*run_number, 4);
                assert_eq!(run_id, "run-4");
            }
            BestScore::NoBestYet => panic!("expected a best run"),
        }
    }

    #[test]
    fn test_nan_never_promotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.bin");
        let mut promoter = Promoter::new(ArtifactStore::new(&path));

        assert!(!offer(&mut promoter, 1, f64::NAN));
        assert_eq!(*promoter.best(), BestScore::NoBestYet);
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_best() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the artifact file should go makes the rename fail
        let path = dir.path().join("best.bin");
        fs::create_dir_all(path.join("occupied")).unwrap();
        let mut promoter = Promoter::new(ArtifactStore::new(&path));

        let combination = HyperparameterSpace::default().combinations()[0];
        let result = promoter.consider(Candidate {
            run_number: 1,
            run_id: "run-1",
            combination,
            rmse: 0.3,
            artifact: b"bytes",
        });
        assert!(result.is_err());
        assert_eq!(*promoter.best(), BestScore::NoBestYet);
    }
}
