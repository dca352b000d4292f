// ============================================================
// Layer 5 - Training Loop
// ============================================================
// Trains ONE hyperparameter combination from scratch:
//
//   1. seed the backend, build a fresh LstmRegressor
//   2. Adam on MSE for `epoch_count` epochs over shuffled
//      mini-batches of `batch_size`
//   3. after each epoch, MSE over the test partition with
//      model.valid() (dropout off), logged for monitoring only
//   4. one forward pass over the whole test partition; those
//      predictions are what the run is scored on
//
// Training uses TrainBackend (Autodiff<InferBackend>), so the
// validation batcher and the final prediction run on the
// inner backend with no autodiff overhead.
//
// fit() returns an error when the loss or the predictions stop
// being finite. Panics from inside Burn propagate; the
// training session turns them into a failed run.

use anyhow::{anyhow, bail, ensure, Result};
use burn::{
    data::dataloader::{batcher::Batcher, DataLoaderBuilder},
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use chrono::Utc;

use crate::data::{batcher::SequenceBatcher, dataset::WindowDataset};
use crate::domain::hyperparams::HyperparameterCombination;
use crate::domain::run_record::RunMetrics;
use crate::domain::sequence::{SequenceDataset, SequenceSample};
use crate::domain::shape::InputShape;
use crate::domain::traits::{CombinationFitter, FittedModel, Persistable};
use crate::infra::artifact::{ArtifactHeader, ModelArtifact};
use crate::ml::model::{weights_to_bytes, LstmRegressor, LstmRegressorConfig};
use crate::ml::{InferBackend, ModelDevice, TrainBackend};

pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
pub const DEFAULT_SEED: u64 = 42;

// ─── LstmArtifactModel ────────────────────────────────────────────────────────
/// A trained regressor together with everything needed to rebuild it.
#[derive(Debug)]
pub struct LstmArtifactModel {
    pub model:       LstmRegressor<InferBackend>,
    pub config:      LstmRegressorConfig,
    pub shape:       InputShape,
    pub combination: HyperparameterCombination,
}

impl Persistable for LstmArtifactModel {
    fn to_artifact_bytes(&self, metrics: &RunMetrics) -> Result<Vec<u8>> {
        let header = ArtifactHeader {
            model:       self.config.clone(),
            input_shape: self.shape,
            combination: self.combination,
            metrics:     Some(*metrics),
            created_at:  Utc::now(),
        };
        ModelArtifact::new(header, weights_to_bytes(&self.model)?).to_bytes()
    }
}

// ─── BurnFitter ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct BurnFitter {
    learning_rate: f64,
    seed:          u64,
    device:        ModelDevice,
}

impl Default for BurnFitter {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE, DEFAULT_SEED)
    }
}

impl BurnFitter {
    pub fn new(learning_rate: f64, seed: u64) -> Self {
        let device = ModelDevice::default();
        tracing::debug!("Training device: {:?}", device);
        Self { learning_rate, seed, device }
    }

    fn train(
        &self,
        combination: &HyperparameterCombination,
        dataset:     &SequenceDataset,
    ) -> Result<FittedModel<LstmArtifactModel>> {
        let shape = dataset.shape();
        TrainBackend::seed(self.seed);

        // ── Build model ───────────────────────────────────────────────────────
        let model_cfg = LstmRegressorConfig::new(
            shape.feature_count,
            combination.hidden_units,
            combination.dropout_rate,
        );
        let mut model: LstmRegressor<TrainBackend> = model_cfg.init(&self.device);
        let mut optim = AdamConfig::new().init();

        // ── Data loaders ──────────────────────────────────────────────────────
        let train_loader = DataLoaderBuilder::new(SequenceBatcher::<TrainBackend>::new(self.device.clone(), shape))
            .batch_size(combination.batch_size)
            .shuffle(self.seed)
            .num_workers(1)
            .build(WindowDataset::new(dataset.train().to_vec()));

        let val_loader = DataLoaderBuilder::new(SequenceBatcher::<InferBackend>::new(self.device.clone(), shape))
            .batch_size(combination.batch_size)
            .num_workers(1)
            .build(WindowDataset::new(dataset.test().to_vec()));

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in 1..=combination.epoch_count {
            let mut train_loss_sum = 0.0f64;
            let mut train_batches  = 0usize;

            for batch in train_loader.iter() {
                let (loss, _) = model.forward_loss(batch.windows, batch.targets);

                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                if !loss_val.is_finite() {
                    bail!("training loss became {loss_val} in epoch {epoch}");
                }
                train_loss_sum += loss_val;
                train_batches  += 1;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(self.learning_rate, model, grads);
            }

            // Weighted by batch size so a short last batch counts for what it holds
            let model_valid = model.valid();
            let mut val_sq_sum = 0.0f64;
            let mut val_count  = 0usize;
            for batch in val_loader.iter() {
                let n = batch.targets.dims()[0];
                let output = model_valid.forward(batch.windows);
                let mse: f64 = MseLoss::new()
                    .forward(output, batch.targets, Reduction::Mean)
                    .into_scalar()
                    .elem::<f64>();
                val_sq_sum += mse * n as f64;
                val_count  += n;
            }

            tracing::debug!(
                "Epoch {:>3}/{} | train_loss={:.6} | val_loss={:.6}",
                epoch,
                combination.epoch_count,
                train_loss_sum / train_batches.max(1) as f64,
                val_sq_sum / val_count.max(1) as f64,
            );
        }

        // ── Score on the whole test partition ─────────────────────────────────
        let model = model.valid();
        let predictions = predict_all(&model, dataset.test(), shape, &self.device)?;

        Ok(FittedModel {
            model: LstmArtifactModel {
                model,
                config: model_cfg,
                shape,
                combination: *combination,
            },
            predictions,
        })
    }
}

impl CombinationFitter for BurnFitter {
    type Model = LstmArtifactModel;

    fn fit(
        &self,
        combination: &HyperparameterCombination,
        dataset:     &SequenceDataset,
    ) -> Result<FittedModel<LstmArtifactModel>> {
        self.train(combination, dataset)
    }
}

/// One batch holding every sample, predictions returned in sample order.
pub fn predict_all(
    model:   &LstmRegressor<InferBackend>,
    samples: &[SequenceSample],
    shape:   InputShape,
    device:  &ModelDevice,
) -> Result<Vec<f32>> {
    let batch = SequenceBatcher::<InferBackend>::new(device.clone(), shape).batch(samples.to_vec());
    let predictions = model
        .forward(batch.windows)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read predictions: {e:?}"))?;

    ensure!(
        predictions.iter().all(|p| p.is_finite()),
        "model produced non-finite predictions"
    );
    Ok(predictions)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::shape::FeatureWindow;
    use crate::infra::artifact::ModelArtifact;
    use crate::ml::inferencer::Inferencer;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Label is the mean of the window's last row, plus a little noise.
    pub(crate) fn synthetic(n_train: usize, n_test: usize, shape: InputShape) -> SequenceDataset {
        let mut rng = StdRng::seed_from_u64(7);
        let mut make = |n: usize| -> Vec<SequenceSample> {
            (0..n)
                .map(|_| {
                    let window: Vec<f32> = (0..shape.len()).map(|_| rng.gen_range(0.0..1.0)).collect();
                    let last = &window[shape.len() - shape.feature_count..];
                    let label = last.iter().sum::<f32>() / shape.feature_count as f32
                        + rng.gen_range(-0.01..0.01);
                    SequenceSample::new(window, label)
                })
                .collect()
        };
        let train = make(n_train);
        let test = make(n_test);
        SequenceDataset::new(shape, train, test).unwrap()
    }

    /// Same windows as `synthetic`, but every label is close to f32::MAX,
    /// so the squared error of the first batch overflows to infinity.
    pub(crate) fn overflowing(n_train: usize, n_test: usize, shape: InputShape) -> SequenceDataset {
        let base = synthetic(n_train, n_test, shape);
        let lift = |samples: &[SequenceSample]| -> Vec<SequenceSample> {
            samples.iter().map(|s| SequenceSample::new(s.window.clone(), 3.0e38)).collect()
        };
        SequenceDataset::new(shape, lift(base.train()), lift(base.test())).unwrap()
    }

    fn combination() -> HyperparameterCombination {
        HyperparameterCombination { hidden_units: 8, dropout_rate: 0.2, batch_size: 16, epoch_count: 2 }
    }

    #[test]
    fn test_fit_predicts_every_test_sample() {
        let dataset = synthetic(48, 12, InputShape::default());
        let fitted = BurnFitter::default().fit(&combination(), &dataset).unwrap();

        assert_eq!(fitted.predictions.len(), 12);
        let metrics = RunMetrics::evaluate(&fitted.predictions, &dataset.test_labels()).unwrap();
        assert!(metrics.rmse.is_finite() && metrics.rmse >= 0.0);
    }

    #[test]
    fn test_artifact_reproduces_predictions() {
        let shape = InputShape::default();
        let dataset = synthetic(32, 4, shape);
        let fitted = BurnFitter::default().fit(&combination(), &dataset).unwrap();

        let metrics = RunMetrics::evaluate(&fitted.predictions, &dataset.test_labels()).unwrap();
        let bytes = fitted.model.to_artifact_bytes(&metrics).unwrap();
        let artifact = ModelArtifact::from_bytes(&bytes).unwrap();
        assert_eq!(artifact.header.combination, combination());
        assert_eq!(artifact.header.input_shape, shape);

        let inferencer = Inferencer::from_artifact(artifact).unwrap();
        let window = FeatureWindow::from_flat(shape, dataset.test()[0].window.clone()).unwrap();
        let served = inferencer.predict(&window).unwrap();

        assert_eq!(served.len(), 1);
        assert_eq!(served[0].len(), 1);
        assert!((served[0][0] - fitted.predictions[0]).abs() < 1e-5);
    }

    #[test]
    fn test_overflowing_loss_fails_the_fit() {
        let dataset = overflowing(16, 4, InputShape::default());
        let err = BurnFitter::default().fit(&combination(), &dataset).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("training loss became"), "unexpected error: {message}");
        assert!(message.contains("epoch 1"));
    }
}
