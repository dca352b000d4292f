// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// From the windowed dataset file to tensor batches:
//
//   sequences.json
//       │
//       ▼
//   SequenceFileLoader → parses and validates windows,
//       │                infers (window_length, feature_count)
//       ▼
//   WindowDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   SequenceBatcher    → stacks samples into [N, T, F] / [N, 1]
//       │
//       ▼
//   DataLoader         → feeds batches to the training loop

/// Reads the windowed train/test JSON file
pub mod loader;

/// Implements Burn's Dataset trait for (window, label) samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
