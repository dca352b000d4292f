// ============================================================
// Layer 4 - Window Batcher
// ============================================================
// Stacks N samples into the tensors the regressor consumes:
//
//   windows: [N, window_length, feature_count]
//   targets: [N, 1]
//
// Samples already hold their window flat and row-major, so
// concatenating them in order and giving the buffer a 3-D
// shape is all the work there is.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::domain::sequence::SequenceSample;
use crate::domain::shape::InputShape;

// ─── SequenceBatch ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SequenceBatch<B: Backend> {
    /// [batch_size, window_length, feature_count]
    pub windows: Tensor<B, 3>,

    /// [batch_size, 1]
    pub targets: Tensor<B, 2>,
}

// ─── SequenceBatcher ──────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct SequenceBatcher<B: Backend> {
    pub device: B::Device,
    pub shape:  InputShape,
}

impl<B: Backend> SequenceBatcher<B> {
    pub fn new(device: B::Device, shape: InputShape) -> Self {
        Self { device, shape }
    }

    /// Tensor for windows that are already flat, e.g. a validated request.
    pub fn windows(&self, flat: Vec<f32>, count: usize) -> Tensor<B, 3> {
        let data = TensorData::new(
            flat,
            [count, self.shape.window_length, self.shape.feature_count],
        );
        Tensor::from_data(data, &self.device)
    }
}

impl<B: Backend> Batcher<SequenceSample, SequenceBatch<B>> for SequenceBatcher<B> {
    fn batch(&self, items: Vec<SequenceSample>) -> SequenceBatch<B> {
        let batch_size = items.len();

        let flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.window.iter().copied())
            .collect();

        let labels: Vec<f32> = items.iter().map(|s| s.label).collect();

        let windows = self.windows(flat, batch_size);
        let targets = Tensor::from_data(TensorData::new(labels, [batch_size, 1]), &self.device);

        SequenceBatch { windows, targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::{InferBackend, ModelDevice};

    #[test]
    fn test_batch_shapes_and_order() {
        let shape = InputShape::new(2, 3);
        let batcher = SequenceBatcher::<InferBackend>::new(ModelDevice::default(), shape);

        let items = vec![
            SequenceSample::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], 10.0),
            SequenceSample::new(vec![6.0, 7.0, 8.0, 9.0, 10.0, 11.0], 20.0),
        ];
        let batch = batcher.batch(items);

        assert_eq!(batch.windows.dims(), [2, 2, 3]);
        assert_eq!(batch.targets.dims(), [2, 1]);

        let windows = batch.windows.into_data().to_vec::<f32>().unwrap();
        assert_eq!(windows[6], 6.0);
        assert_eq!(windows[11], 11.0);
        let targets = batch.targets.into_data().to_vec::<f32>().unwrap();
        assert_eq!(targets, vec![10.0, 20.0]);
    }
}
