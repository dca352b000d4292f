// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All Burn framework code lives here (plus the dataset and
// batcher adapters in Layer 4).
//
//   model.rs      - LSTM → dropout → dense(1) regressor and
//                   its weight (de)serialization
//
//   trainer.rs    - BurnFitter: trains one hyperparameter
//                   combination with Adam on MSE, then
//                   predicts the whole test partition
//
//   inferencer.rs - Inferencer: the loaded promoted model,
//                   shared by concurrent requests
//
// Backends: training runs on Autodiff<InferBackend>, and
// `model.valid()` hands back the same module on InferBackend
// with dropout disabled. The default is the ndarray CPU
// backend; the `wgpu` feature switches both to the GPU.

use burn::tensor::backend::Backend;

/// LSTM regressor architecture
pub mod model;

/// Per-combination training loop
pub mod trainer;

/// Serving-side model wrapper
pub mod inferencer;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InferBackend>;

pub type ModelDevice = <InferBackend as Backend>::Device;
