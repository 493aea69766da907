// ============================================================
// Layer 2 — Out-of-Memory Recovery
// ============================================================
// Runs a training attempt and, if it dies of device memory
// exhaustion, runs it exactly once more in reduced-memory mode:
//
//   Standard ──OOM──▶ warn, release memory ──▶ ReducedMemory
//       │                                          │
//       └── Ok / other error ──▶ returned          └──▶ returned as is
//
// Backend panics are caught at the attempt boundary and turned
// into TrainError::Backend so a panic saying "out of memory"
// takes the same path as a typed OutOfMemory error.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::ml::error::{TrainError, TrainResult};

/// How an attempt builds its autodiff graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptMode {
    /// Whole batches through forward and backward.
    Standard,
    /// Batches split into micro-batches with accumulated gradients.
    ReducedMemory,
}

/// Run `attempt` in panic-safe fashion.
pub fn guarded<T>(attempt: impl FnOnce() -> TrainResult<T>) -> TrainResult<T> {
    catch_unwind(AssertUnwindSafe(attempt)).unwrap_or_else(|payload| Err(TrainError::from_panic(payload)))
}

/// Run `attempt(Standard)`; on OOM call `release` and retry once with `ReducedMemory`.
pub fn with_oom_retry<T, F, R>(mut attempt: F, release: R) -> TrainResult<T>
where
    F: FnMut(AttemptMode) -> TrainResult<T>,
    R: FnOnce(),
{
    match guarded(|| attempt(AttemptMode::Standard)) {
        Err(e) if e.is_out_of_memory() => {
            tracing::warn!(
                "Detected out-of-memory error ({e}). Splitting batches into micro-batches to \
                 reduce memory usage, but this slows down training. Consider enabling AMP (--amp) \
                 for fast and memory efficient training"
            );
            release();
            guarded(|| attempt(AttemptMode::ReducedMemory))
        }
        other => other,
    }
}
