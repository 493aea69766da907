// ============================================================
// Layer 3 — Experiment Log Records
// ============================================================
// What the training loop hands to an ExperimentSink:
//   - scalars    (loss, learning rate, validation Dice)
//   - images     (input / true mask / predicted mask)
//   - histograms (weights and gradients per parameter)
//
// Every record carries the global step and the epoch so a
// backend can plot it on either axis.

use serde::Serialize;
use std::collections::BTreeMap;

/// Fixed-width histogram of a tensor's values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min:    f32,
    pub max:    f32,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Bin `values` into `bins` equal-width buckets.
    ///
    /// Returns None for empty input or when any value is NaN or
    /// infinite: such tensors are left out of diagnostics.
    pub fn from_values(values: &[f32], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 || values.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut counts = vec![0u64; bins];

        let width = (max - min) / bins as f32;
        for &v in values {
            let idx = if width > 0.0 {
                (((v - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }

        Some(Self { min, max, counts })
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// An 8-bit raster ready to be written by a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub width:    u32,
    pub height:   u32,
    /// 1 (grayscale) or 3 (RGB)
    pub channels: u8,
    /// Interleaved HWC pixels
    pub pixels:   Vec<u8>,
}

/// One experiment-log entry keyed by step and epoch.
#[derive(Debug, Clone, Default)]
pub struct LogRecord {
    pub step:       usize,
    pub epoch:      usize,
    pub scalars:    BTreeMap<String, f64>,
    pub images:     BTreeMap<String, ImageRecord>,
    pub histograms: BTreeMap<String, Histogram>,
}

impl LogRecord {
    pub fn new(step: usize, epoch: usize) -> Self {
        Self { step, epoch, ..Default::default() }
    }

    pub fn scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.scalars.insert(name.into(), value);
        self
    }

    pub fn image(mut self, name: impl Into<String>, image: ImageRecord) -> Self {
        self.images.insert(name.into(), image);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_counts_every_value() {
        let values: Vec<f32> = (0..100).map(|v| v as f32).collect();
        let h = Histogram::from_values(&values, 10).unwrap();
        assert_eq!(h.total(), 100);
        assert_eq!(h.counts, vec![10; 10]);
        assert_eq!(h.min, 0.0);
        assert_eq!(h.max, 99.0);
    }

    #[test]
    fn test_histogram_constant_values() {
        let h = Histogram::from_values(&[2.0, 2.0, 2.0], 4).unwrap();
        assert_eq!(h.counts, vec![3, 0, 0, 0]);
    }

    #[test]
    fn test_histogram_skips_non_finite() {
        assert!(Histogram::from_values(&[1.0, f32::NAN], 4).is_none());
        assert!(Histogram::from_values(&[1.0, f32::INFINITY], 4).is_none());
        assert!(Histogram::from_values(&[], 4).is_none());
    }

    #[test]
    fn test_record_builder() {
        let r = LogRecord::new(7, 2).scalar("train loss", 0.5);
        assert_eq!(r.step, 7);
        assert_eq!(r.epoch, 2);
        assert_eq!(r.scalars["train loss"], 0.5);
    }
}
