// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores a saved checkpoint on the validation split of the run
// that produced it:
//
//   Step 1: Read train_config.json from the checkpoint dir
//   Step 2: Rebuild the U-Net and load the weights
//           (explicit path, or the latest epoch saved)
//   Step 3: Re-assemble the dataset and redo the seeded split
//   Step 4: Mean validation Dice over full batches

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use std::{path::PathBuf, sync::Arc};

use crate::data::{
    batch_loader::{BatchLoader, BatchLoaderConfig},
    batcher::SegmentationBatcher,
    loader::{DatasetAssembler, DatasetVariant},
    splitter::split_train_val,
};
use crate::domain::sample::Sample;
use crate::infra::checkpoint::{load_checkpoint, CheckpointManager};
use crate::ml::{
    backend::{select_device, ComputeBackend},
    evaluate::evaluate,
};

pub struct EvaluateUseCase {
    checkpoint_dir: PathBuf,
    checkpoint:     Option<PathBuf>,
}

/// Result of an evaluation run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateReport {
    pub checkpoint:  PathBuf,
    pub val_samples: usize,
    pub dice:        f64,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, checkpoint: Option<PathBuf>) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), checkpoint }
    }

    pub fn execute(&self) -> Result<EvaluateReport> {
        // ── Step 1: Run configuration ─────────────────────────────────────────
        let ckpt = CheckpointManager::open(&self.checkpoint_dir);
        let cfg  = ckpt.load_config()?;

        // ── Step 2: Network + weights ─────────────────────────────────────────
        let device = select_device();
        let path = match &self.checkpoint {
            Some(path) => path.clone(),
            None => ckpt.latest_checkpoint()?,
        };
        let model = load_checkpoint(cfg.model_config().init::<ComputeBackend>(&device), &path, &device)?;
        tracing::info!("Evaluating checkpoint '{}'", path.display());

        // ── Step 3: Same dataset, same split ──────────────────────────────────
        let (dataset, variant) = DatasetAssembler::new(&cfg.images_dir, &cfg.masks_dir, cfg.img_scale)
            .assemble(&DatasetVariant::FALLBACK_ORDER)
            .context("Cannot build the dataset")?;
        tracing::debug!("Scoring on the {} layout", variant.name());
        let (_, val) = split_train_val(dataset, cfg.val_fraction, cfg.split_seed);
        let val_samples = val.len();
        let val: Arc<dyn Dataset<Sample>> = Arc::new(val);

        // ── Step 4: Score ─────────────────────────────────────────────────────
        let loader = BatchLoader::new(
            val,
            SegmentationBatcher::<ComputeBackend>::new(device.clone()),
            BatchLoaderConfig::new(cfg.batch_size)
                .with_drop_last(true)
                .with_num_workers(cfg.num_workers),
        )?;
        let dice = evaluate(&model, loader.iter(0))?;

        Ok(EvaluateReport { checkpoint: path, val_samples, dice })
    }
}
