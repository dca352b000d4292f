// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing the core
// concepts of the system: the hyperparameter search space,
// the run records it produces, the sequence data it consumes
// and the fixed input shape shared by training and serving.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O or network calls
//
// Everything here is testable without a model or a device.

// Hyperparameter combinations and the Cartesian search space
pub mod hyperparams;

// Per-run metrics (RMSE, MAE, R²) and the tracker record
pub mod run_record;

// Input shape contract and request-side window validation
pub mod shape;

// Windowed train/test dataset produced by the sequence provider
pub mod sequence;

// Core abstractions (traits) that other layers implement
pub mod traits;
