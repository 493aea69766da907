// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the trainer
// works with: samples, log records, and the experiment sink.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits

// An (image, mask) pair after preprocessing
pub mod sample;

// Experiment log records: scalars, images, histograms
pub mod record;

// Core abstractions (traits) that other layers implement
pub mod traits;
