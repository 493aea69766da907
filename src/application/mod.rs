// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: the use cases tell the data, ml
// and infra layers what to do, in which order, and never do
// tensor math themselves.
//
// Reference: Clean Architecture pattern

// The training workflow
pub mod train_use_case;

// Scoring a saved checkpoint
pub mod evaluate_use_case;

// One retry on device memory exhaustion
pub mod recovery;
