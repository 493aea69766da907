// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the run's output directories:
//
//   checkpoint.rs — per-epoch weight records (plus the reserved
//                   mask_values field) and the saved run config
//   metrics.rs    — per-epoch summary CSV
//   experiment.rs — ExperimentSink implementations (JSON lines
//                   with PNG media, or nothing at all)
//
// Reference: Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Experiment logging backends
pub mod experiment;
