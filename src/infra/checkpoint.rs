// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights with Burn's named
// MessagePack recorder at full precision, so a restored model
// is bit-identical to the saved one.
//
// Each checkpoint is a named record with two fields:
//   model        — every U-Net parameter by name
//   mask_values  — the dataset's raw mask values, label i ↔ value i
//
// Loading destructures the record and keeps only `model`;
// missing or mismatched parameter names fail the load.
//
// File naming convention:
//   checkpoints/
//     checkpoint_epoch1.mpk  ← weights after epoch 1
//     checkpoint_epoch2.mpk
//     ...
//     latest_epoch.json      ← number of the latest epoch saved
//     train_config.json      ← run configuration (architecture included)
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::sample::MaskValue;
use crate::ml::model::{UNet, UNetRecord};

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// What a checkpoint file holds.
#[derive(Record)]
pub struct CheckpointRecord<B: Backend> {
    pub model:       UNetRecord<B>,
    pub mask_values: Vec<MaskValue>,
}

/// Write `model` and the reserved `mask_values` field to `path` (`.mpk` is appended).
pub fn save_checkpoint<B: Backend>(model: &UNet<B>, mask_values: &[MaskValue], path: &Path) -> Result<()> {
    let record = CheckpointRecord {
        model:       model.clone().into_record(),
        mask_values: mask_values.to_vec(),
    };
    CheckpointRecorder::new()
        .record(record, path.to_path_buf())
        .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))
}

/// Restore weights from a checkpoint into `model`, discarding `mask_values`.
pub fn load_checkpoint<B: Backend>(model: UNet<B>, path: &Path, device: &B::Device) -> Result<UNet<B>> {
    let CheckpointRecord { model: record, mask_values } = CheckpointRecorder::new()
        .load::<CheckpointRecord<B>>(path.to_path_buf(), device)
        .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

    tracing::debug!("Checkpoint carries {} mask values; not needed for weights", mask_values.len());
    Ok(model.load_record(record))
}

/// Manages the checkpoint directory of one run.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Open (and create if needed) a checkpoint directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating it.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the epoch's checkpoint, without the recorder's extension.
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(format!("checkpoint_epoch{epoch}"))
    }

    /// Save `model` for `epoch` and advance latest_epoch.json.
    pub fn save_epoch<B: Backend>(
        &self,
        model:       &UNet<B>,
        mask_values: &[MaskValue],
        epoch:       usize,
    ) -> Result<PathBuf> {
        let path = self.epoch_path(epoch);
        save_checkpoint(model, mask_values, &path)?;

        let latest_path = self.dir.join("latest_epoch.json");
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(path)
    }

    /// Path of the most recently saved checkpoint.
    pub fn latest_checkpoint(&self) -> Result<PathBuf> {
        Ok(self.epoch_path(self.latest_epoch()?))
    }

    /// Save the run configuration so `evaluate` can rebuild the model.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'evaluate'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");
        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest_epoch.json'. Have you run 'train' with checkpoints enabled?")?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}
