// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor code, no HTTP, no
// file formats. Each use case wires Layer 4-6 pieces
// together for one command.
//
//   train_use_case - dataset → sweep → promoted artifact
//   serve_use_case - promoted artifact → HTTP service
//   session        - the sweep itself (fault isolation,
//                    tracking, promotion per run)
//   promoter       - Best-Score State and artifact replacement

/// Train command workflow
pub mod train_use_case;

/// Serve command workflow
pub mod serve_use_case;

/// Grid search session over one hyperparameter space
pub mod session;

/// Best-so-far tracking and promotion
pub mod promoter;
