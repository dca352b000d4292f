// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Cross-cutting concerns shared by training and serving:
//
//   artifact.rs - The promoted model file. Encodes model
//                 config + weights into one self-describing
//                 file and replaces it atomically
//                 (write temp, fsync, rename).
//
//   tracker.rs  - Experiment tracking. Appends one JSON line
//                 per run to an append-only log and keeps a
//                 copy of each run's model.
//
//   metrics.rs  - Service metrics. Atomic request counter and
//                 latency histogram rendered in the Prometheus
//                 text format.

/// Promoted model file format and atomic replacement
pub mod artifact;

/// Append-only experiment tracking log
pub mod tracker;

/// Request counter and latency histogram
pub mod metrics;
