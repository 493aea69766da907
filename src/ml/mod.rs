// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model math lives here:
//
//   backend.rs     — backend aliases and device selection
//   model.rs       — the U-Net (DoubleConv / Down / Up / OutConv)
//   loss.rs        — BCE / cross-entropy + Dice loss terms
//   evaluate.rs    — validation Dice score
//   grad_scaler.rs — dynamic loss scaling for --amp
//   grad_clip.rs   — global gradient norm clipping
//   scheduler.rs   — ReduceLROnPlateau
//   diagnostics.rs — histograms and sample masks for the sink
//   trainer.rs     — the training loop
//   error.rs       — TrainError and OOM detection
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Ronneberger et al. (2015) U-Net

pub mod backend;
pub mod diagnostics;
pub mod error;
pub mod evaluate;
pub mod grad_clip;
pub mod grad_scaler;
pub mod loss;
pub mod model;
pub mod scheduler;
pub mod trainer;
