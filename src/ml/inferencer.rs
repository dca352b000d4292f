// ============================================================
// Layer 5 - Inferencer
// ============================================================
// The serving side of the model. Built once at startup from
// the promoted artifact and then shared by every request.
//
// Burn modules are Send but not necessarily Sync, so the
// model sits behind a Mutex and forward passes are
// serialized. Nothing ever mutates it after loading, so a
// poisoned lock (a panic during an earlier forward pass)
// still guards a usable model.

use std::sync::Mutex;

use anyhow::{anyhow, ensure, Context, Result};

use crate::data::batcher::SequenceBatcher;
use crate::domain::shape::{FeatureWindow, InputShape};
use crate::infra::artifact::{ArtifactHeader, ModelArtifact};
use crate::ml::model::{model_from_bytes, LstmRegressor};
use crate::ml::{InferBackend, ModelDevice};

pub struct Inferencer {
    model:  Mutex<LstmRegressor<InferBackend>>,
    header: ArtifactHeader,
    device: ModelDevice,
}

impl Inferencer {
    /// Rebuild the exact graph the artifact was trained with.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        let device = ModelDevice::default();
        let ModelArtifact { header, weights } = artifact;

        ensure!(
            header.model.feature_count == header.input_shape.feature_count,
            "artifact header is inconsistent: model expects {} features, input shape has {}",
            header.model.feature_count,
            header.input_shape.feature_count
        );

        let model = model_from_bytes::<InferBackend>(&header.model, weights, &device)
            .context("Artifact weights do not match its model config")?;

        tracing::info!(
            "Model loaded: {} | input shape (1, {}, {})",
            header.combination,
            header.input_shape.window_length,
            header.input_shape.feature_count
        );
        Ok(Self { model: Mutex::new(model), header, device })
    }

    pub fn input_shape(&self) -> InputShape {
        self.header.input_shape
    }

    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    /// Forward pass over one validated window. Output shape (1, 1).
    pub fn predict(&self, window: &FeatureWindow) -> Result<Vec<Vec<f32>>> {
        let shape = self.input_shape();
        ensure!(
            window.shape() == shape,
            "window shape ({}, {}) does not match model input ({}, {})",
            window.shape().window_length,
            window.shape().feature_count,
            shape.window_length,
            shape.feature_count
        );

        let batcher = SequenceBatcher::<InferBackend>::new(self.device.clone(), shape);
        let input = batcher.windows(window.values().to_vec(), 1);

        let output = {
            let model = self.model.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            model.forward(input)
        };

        let [rows, cols] = output.dims();
        let flat = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read model output: {e:?}"))?;
        ensure!(flat.iter().all(|v| v.is_finite()), "model produced a non-finite prediction");

        let nested: Vec<Vec<f32>> = flat.chunks(cols).map(<[f32]>::to_vec).collect();
        debug_assert_eq!(nested.len(), rows);
        Ok(nested)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::hyperparams::HyperparameterCombination;
    use crate::ml::model::{weights_to_bytes, LstmRegressorConfig};

    /// An untrained model packed the same way training packs one.
    pub(crate) fn untrained_artifact(shape: InputShape) -> ModelArtifact {
        let device = ModelDevice::default();
        let config = LstmRegressorConfig::new(shape.feature_count, 4, 0.2);
        let model: LstmRegressor<InferBackend> = config.init(&device);
        let header = ArtifactHeader {
            model:       config,
            input_shape: shape,
            combination: HyperparameterCombination {
                hidden_units: 4,
                dropout_rate: 0.2,
                batch_size:   32,
                epoch_count:  20,
            },
            metrics:     None,
            created_at:  chrono::Utc::now(),
        };
        ModelArtifact::new(header, weights_to_bytes(&model).unwrap())
    }

    #[test]
    fn test_predict_shape() {
        let shape = InputShape::default();
        let inferencer = Inferencer::from_artifact(untrained_artifact(shape)).unwrap();

        let window = FeatureWindow::from_flat(shape, vec![0.5; shape.len()]).unwrap();
        let prediction = inferencer.predict(&window).unwrap();
        assert_eq!(prediction.len(), 1);
        assert_eq!(prediction[0].len(), 1);
        assert!(prediction[0][0].is_finite());

        // Dropout is inactive outside autodiff: same input, same output
        assert_eq!(prediction, inferencer.predict(&window).unwrap());
    }

    #[test]
    fn test_wrong_window_shape_is_an_error() {
        let inferencer = Inferencer::from_artifact(untrained_artifact(InputShape::default())).unwrap();
        let other = InputShape::new(4, 5);
        let window = FeatureWindow::from_flat(other, vec![0.0; other.len()]).unwrap();
        assert!(inferencer.predict(&window).is_err());
    }
}
