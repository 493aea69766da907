// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Pick the device                 (Layer 5 - ml)
//   Step 2: Assemble the dataset            (Layer 4 - data)
//   Step 3: Split train/validation          (Layer 4 - data)
//   Step 4: Build (and optionally load) net (Layer 5 - ml)
//   Step 5: Prepare outputs + save config   (Layer 6 - infra)
//   Step 6: Train, retrying once on OOM     (Layers 2 + 5)
//
// Every attempt starts from a clone of the same initial
// weights. The retry trains in micro-batches of
// `micro_batch_size` samples with accumulated gradients.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::{data::dataset::Dataset, prelude::*};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};

use crate::application::recovery::{with_oom_retry, AttemptMode};
use crate::data::{
    batch_loader::default_workers,
    loader::{DatasetAssembler, DatasetVariant},
    splitter::{split_train_val, SPLIT_SEED},
};
use crate::domain::traits::ExperimentSink;
use crate::infra::{
    checkpoint::{load_checkpoint, CheckpointManager},
    experiment::{JsonlSink, NoopSink},
    metrics::MetricsLogger,
};
use crate::ml::{
    backend::{select_device, ComputeBackend, ComputeDevice, StandardBackend},
    error::TrainResult,
    model::{UNet, UNetConfig},
    trainer::{train_model, MemoryMode, RunOutputs, TrainingData},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every parameter of a run. Saved as train_config.json so
// `evaluate` can rebuild the same network and split.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub images_dir:        PathBuf,
    pub masks_dir:         PathBuf,
    pub checkpoint_dir:    PathBuf,
    pub log_dir:           PathBuf,
    pub epochs:            usize,
    pub batch_size:        usize,
    pub learning_rate:     f64,
    /// Fraction of samples held out for validation, in [0, 1).
    pub val_fraction:      f64,
    pub save_checkpoint:   bool,
    pub img_scale:         f64,
    pub amp:               bool,
    pub weight_decay:      f64,
    pub momentum:          f64,
    pub gradient_clipping: f64,
    pub n_channels:        usize,
    pub n_classes:         usize,
    pub bilinear:          bool,
    pub base_channels:     usize,
    pub load:              Option<PathBuf>,
    pub split_seed:        u64,
    pub shuffle_seed:      u64,
    pub num_workers:       usize,
    pub experiment_log:    bool,
    /// Samples per forward/backward pass after an OOM retry.
    pub micro_batch_size:  usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            images_dir:        PathBuf::from("data/imgs"),
            masks_dir:         PathBuf::from("data/masks"),
            checkpoint_dir:    PathBuf::from("checkpoints"),
            log_dir:           PathBuf::from("runs"),
            epochs:            5,
            batch_size:        2,
            learning_rate:     1e-5,
            val_fraction:      0.1,
            save_checkpoint:   true,
            img_scale:         0.5,
            amp:               false,
            weight_decay:      1e-8,
            momentum:          0.999,
            gradient_clipping: 1.0,
            n_channels:        3,
            n_classes:         2,
            bilinear:          false,
            base_channels:     64,
            load:              None,
            split_seed:        SPLIT_SEED,
            shuffle_seed:      42,
            num_workers:       default_workers(),
            experiment_log:    true,
            micro_batch_size:  1,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self) -> UNetConfig {
        UNetConfig::new(self.n_channels, self.n_classes)
            .with_bilinear(self.bilinear)
            .with_base_channels(self.base_channels)
    }
}

/// What a finished run reports back to the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub global_step:   usize,
    pub last_val_dice: Option<f64>,
    pub learning_rate: f64,
    pub mode:          AttemptMode,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainReport> {
        self.execute_with(|_| Ok(()))
    }

    /// `execute`, with `before_attempt` run at the start of each
    /// attempt; an error from it fails that attempt.
    pub(crate) fn execute_with<H>(&self, mut before_attempt: H) -> Result<TrainReport>
    where
        H: FnMut(AttemptMode) -> TrainResult<()>,
    {
        let cfg = &self.config;

        // ── Step 1: Device, chosen once ───────────────────────────────────────
        let device = select_device();

        // ── Step 2: Dataset, Carvana layout first, then plain ─────────────────
        let assembler = DatasetAssembler::new(&cfg.images_dir, &cfg.masks_dir, cfg.img_scale);
        let (dataset, variant) = assembler
            .assemble(&DatasetVariant::FALLBACK_ORDER)
            .context("Cannot build the dataset")?;
        tracing::debug!("Training on the {} layout", variant.name());
        let mask_values = dataset.mask_values().to_vec();

        // ── Step 3: Deterministic split ───────────────────────────────────────
        let (train, val) = split_train_val(dataset, cfg.val_fraction, cfg.split_seed);
        if val.is_empty() {
            tracing::warn!("Validation split is empty; validation Dice will read 0");
        }
        let data = TrainingData {
            train: Arc::new(train),
            val:   Arc::new(val),
            mask_values,
        };

        // ── Step 4: Network ───────────────────────────────────────────────────
        let mut model = cfg.model_config().init::<StandardBackend>(&device);
        tracing::info!(
            "Network:\n\t{} input channels\n\t{} output channels (classes)\n\t{} upscaling",
            model.n_channels,
            model.n_classes,
            model.upscaling(),
        );
        if let Some(path) = &cfg.load {
            model = load_checkpoint(model, path, &device)?;
            tracing::info!("Model loaded from {}", path.display());
        }

        // ── Step 5: Outputs ───────────────────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;
        checkpoints.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.log_dir)?;
        let mut sink: Box<dyn ExperimentSink> = if cfg.experiment_log {
            Box::new(JsonlSink::create(&cfg.log_dir)?)
        } else {
            Box::new(NoopSink)
        };
        if let Err(e) = sink.init(&serde_json::to_value(cfg)?) {
            tracing::warn!("Experiment log unavailable: {e:#}");
        }

        // ── Step 6: Train with one OOM retry ──────────────────────────────────
        let report = with_oom_retry(
            |mode| {
                before_attempt(mode)?;
                let mut out = RunOutputs {
                    sink:        sink.as_mut(),
                    checkpoints: Some(&checkpoints),
                    metrics:     Some(&metrics),
                };
                run_attempt(cfg, model.clone(), &data, &device, &mut out, mode)
            },
            || ComputeBackend::sync(&device),
        )?;

        tracing::info!("Training complete after {} steps", report.global_step);
        Ok(report)
    }
}

/// One full training run from `model`.
fn run_attempt(
    cfg:    &TrainConfig,
    model:  UNet<StandardBackend>,
    data:   &TrainingData,
    device: &ComputeDevice,
    out:    &mut RunOutputs<'_>,
    mode:   AttemptMode,
) -> TrainResult<TrainReport> {
    let memory = match mode {
        AttemptMode::Standard      => MemoryMode::Full,
        AttemptMode::ReducedMemory => MemoryMode::MicroBatched { size: cfg.micro_batch_size },
    };

    let outcome = train_model(cfg, model, data, device, memory, out)?;
    Ok(TrainReport {
        global_step:   outcome.global_step,
        last_val_dice: outcome.last_val_dice,
        learning_rate: outcome.learning_rate,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::tests::write_pairs;
    use crate::ml::error::TrainError;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.epochs, 5);
        assert_eq!(cfg.batch_size, 2);
        assert_eq!(cfg.learning_rate, 1e-5);
        assert_eq!(cfg.img_scale, 0.5);
        assert_eq!(cfg.val_fraction, 0.1);
        assert_eq!(cfg.gradient_clipping, 1.0);
        assert_eq!(cfg.momentum, 0.999);
        assert_eq!(cfg.weight_decay, 1e-8);
        assert!(!cfg.amp);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: TrainConfig = serde_json::from_str(r#"{ "epochs": 2, "n_classes": 1 }"#).unwrap();
        assert_eq!(cfg.epochs, 2);
        assert_eq!(cfg.n_classes, 1);
        assert_eq!(cfg.batch_size, 2);
    }

    #[test]
    fn test_end_to_end_on_basic_layout() {
        let data = tempfile::tempdir().unwrap();
        write_pairs(data.path(), 4, 32, "");
        let out = tempfile::tempdir().unwrap();

        let cfg = TrainConfig {
            images_dir:     data.path().join("imgs"),
            masks_dir:      data.path().join("masks"),
            checkpoint_dir: out.path().join("checkpoints"),
            log_dir:        out.path().join("runs"),
            epochs:         1,
            batch_size:     2,
            learning_rate:  1e-3,
            val_fraction:   0.25,
            base_channels:  2,
            num_workers:    1,
            ..TrainConfig::default()
        };
        let report = TrainUseCase::new(cfg).execute().unwrap();

        // 4 samples, 25% validation → 3 train → 2 batches
        assert_eq!(report.global_step, 2);
        assert_eq!(report.mode, AttemptMode::Standard);
        assert!(out.path().join("checkpoints/checkpoint_epoch1.mpk").exists());
        assert!(out.path().join("checkpoints/train_config.json").exists());
        assert!(out.path().join("runs/metrics.jsonl").exists());
        assert!(out.path().join("runs/metrics.csv").exists());
    }

    #[test]
    fn test_oom_on_first_attempt_finishes_in_reduced_memory_mode() {
        let data = tempfile::tempdir().unwrap();
        write_pairs(data.path(), 5, 32, "_mask");
        let out = tempfile::tempdir().unwrap();

        let cfg = TrainConfig {
            images_dir:     data.path().join("imgs"),
            masks_dir:      data.path().join("masks"),
            checkpoint_dir: out.path().join("checkpoints"),
            log_dir:        out.path().join("runs"),
            epochs:         1,
            batch_size:     2,
            learning_rate:  1e-3,
            val_fraction:   0.2,
            base_channels:  2,
            num_workers:    1,
            ..TrainConfig::default()
        };

        let mut attempts = Vec::new();
        let report = TrainUseCase::new(cfg)
            .execute_with(|mode| {
                attempts.push(mode);
                match mode {
                    AttemptMode::Standard => {
                        Err(TrainError::OutOfMemory("CUDA out of memory".into()))
                    }
                    AttemptMode::ReducedMemory => Ok(()),
                }
            })
            .unwrap();

        assert_eq!(attempts, vec![AttemptMode::Standard, AttemptMode::ReducedMemory]);
        assert_eq!(report.mode, AttemptMode::ReducedMemory);
        // 5 samples, 20% validation → 4 train → 2 batches
        assert_eq!(report.global_step, 2);
        assert!(out.path().join("checkpoints/checkpoint_epoch1.mpk").exists());
    }

    #[test]
    fn test_missing_data_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            images_dir:     dir.path().join("nope"),
            masks_dir:      dir.path().join("nope"),
            checkpoint_dir: dir.path().join("ckpt"),
            log_dir:        dir.path().join("runs"),
            ..TrainConfig::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(format!("{err:#}").contains("Cannot build the dataset"));
    }
}
