// ============================================================
// Layer 6 — Experiment Sinks
// ============================================================
// Implementations of ExperimentSink:
//
//   JsonlSink → <run dir>/metrics.jsonl, one JSON object per
//               record, with images saved as PNG under
//               <run dir>/media/ and referenced by path
//   NoopSink  → accepts and drops everything
//
// Lines look like:
//   {"config": {...}}
//   {"step": 12, "epoch": 1, "scalars": {"train loss": 0.71}}
//   {"step": 45, "epoch": 1, "scalars": {...},
//    "images": {"masks/pred": "media/step45_masks-pred.png"},
//    "histograms": {"Weights/000-…": {"min": …, "max": …, "counts": […]}}}

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::{
    record::{ImageRecord, LogRecord},
    traits::ExperimentSink,
};

pub struct JsonlSink {
    dir:    PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("media"))
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;

        let path = dir.join("metrics.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;

        tracing::info!("Experiment log: '{}'", path.display());
        Ok(Self { dir, writer: BufWriter::new(file) })
    }

    fn write_line(&mut self, value: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn save_image(&self, step: usize, name: &str, image: &ImageRecord) -> Result<String> {
        let file_name = format!("step{step}_{}.png", name.replace('/', "-"));
        let relative = Path::new("media").join(file_name);

        let color = match image.channels {
            1 => image::ColorType::L8,
            3 => image::ColorType::Rgb8,
            other => anyhow::bail!("unsupported channel count {other} for image '{name}'"),
        };
        image::save_buffer(self.dir.join(&relative), &image.pixels, image.width, image.height, color)
            .with_context(|| format!("Cannot save image '{name}'"))?;

        Ok(relative.to_string_lossy().into_owned())
    }
}

impl ExperimentSink for JsonlSink {
    fn init(&mut self, config: &Value) -> Result<()> {
        self.write_line(&json!({ "config": config }))
    }

    fn log(&mut self, record: &LogRecord) -> Result<()> {
        let mut line = Map::new();
        line.insert("step".into(), json!(record.step));
        line.insert("epoch".into(), json!(record.epoch));
        line.insert("scalars".into(), json!(record.scalars));

        if !record.images.is_empty() {
            let mut images = Map::new();
            for (name, image) in &record.images {
                images.insert(name.clone(), json!(self.save_image(record.step, name, image)?));
            }
            line.insert("images".into(), Value::Object(images));
        }
        if !record.histograms.is_empty() {
            line.insert("histograms".into(), serde_json::to_value(&record.histograms)?);
        }

        self.write_line(&Value::Object(line))
    }
}

/// Used when experiment logging is switched off.
#[derive(Debug, Default)]
pub struct NoopSink;

impl ExperimentSink for NoopSink {
    fn init(&mut self, _config: &Value) -> Result<()> {
        Ok(())
    }

    fn log(&mut self, _record: &LogRecord) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::Histogram;

    #[test]
    fn test_jsonl_lines_and_media() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::create(dir.path()).unwrap();
        sink.init(&json!({ "epochs": 5 })).unwrap();

        let mut record = LogRecord::new(3, 1)
            .scalar("validation Dice", 0.5)
            .image("masks/pred", ImageRecord { width: 2, height: 1, channels: 1, pixels: vec![0, 255] });
        record
            .histograms
            .insert("Weights/000".into(), Histogram::from_values(&[1.0, 2.0], 2).unwrap());
        sink.log(&record).unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.jsonl")).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["config"]["epochs"], 5);
        assert_eq!(lines[1]["step"], 3);
        assert_eq!(lines[1]["scalars"]["validation Dice"], 0.5);
        assert_eq!(lines[1]["histograms"]["Weights/000"]["counts"], json!([1, 1]));

        let media = lines[1]["images"]["masks/pred"].as_str().unwrap();
        assert!(dir.path().join(media).exists());
    }

    #[test]
    fn test_unsupported_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::create(dir.path()).unwrap();
        let record = LogRecord::new(1, 1)
            .image("bad", ImageRecord { width: 1, height: 1, channels: 2, pixels: vec![0, 0] });
        assert!(sink.log(&record).is_err());
    }
}
