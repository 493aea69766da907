// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The experiment-logging backend is an injected capability
// rather than process-wide state. The training loop only sees
// ExperimentSink, so a JSON-lines writer, a no-op sink, or an
// in-memory sink in tests all plug in the same way.

use anyhow::Result;

use crate::domain::record::LogRecord;

// ─── ExperimentSink ───────────────────────────────────────────────────────────
/// Receives the run configuration once, then a stream of records.
///
/// Implementations:
///   - JsonlSink → metrics.jsonl plus PNG media under the run directory
///   - NoopSink  → discards everything (--no-experiment-log)
///
/// Errors returned here never abort training; the loop logs
/// and drops them.
pub trait ExperimentSink {
    /// Called once before the first record with the run parameters.
    fn init(&mut self, config: &serde_json::Value) -> Result<()>;

    /// Emit one record.
    fn log(&mut self, record: &LogRecord) -> Result<()>;
}
