// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per finished epoch:
//
//   epoch,train_loss,val_dice,learning_rate
//   1,0.812345,0.701200,0.000010
//   2,0.604311,,0.000010        ← no validation ran this epoch
//
// `val_dice` is the last validation score seen in the epoch.
// Output file: <run dir>/metrics.csv

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Summary of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Mean composite loss over the epoch's training batches
    pub train_loss: f64,

    /// Last validation Dice of the epoch, if validation ran
    pub val_dice: Option<f64>,

    pub learning_rate: f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, val_dice: Option<f64>, learning_rate: f64) -> Self {
        Self { epoch, train_loss, val_dice, learning_rate }
    }

    fn csv_row(&self) -> String {
        let val = self.val_dice.map(|d| format!("{d:.6}")).unwrap_or_default();
        format!("{},{:.6},{},{:.6e}", self.epoch, self.train_loss, val, self.learning_rate)
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// runs sharing a directory append to one log.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,val_dice,learning_rate")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_dice={:?}",
            m.epoch,
            m.train_loss,
            m.val_dice,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_appended_under_header() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&EpochMetrics::new(1, 0.5, Some(0.75), 1e-5)).unwrap();
        logger.log(&EpochMetrics::new(2, 0.25, None, 1e-6)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,train_loss,val_dice,learning_rate");
        assert!(lines[1].starts_with("1,0.500000,0.750000,"));
        assert!(lines[2].starts_with("2,0.250000,,"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_reopening_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path())
            .unwrap()
            .log(&EpochMetrics::new(1, 1.0, None, 1e-5))
            .unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        let text = fs::read_to_string(logger.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
