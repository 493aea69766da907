// ============================================================
// Layer 5 — Training Loop
// ============================================================
// epochs × batches of
//
//   forward → loss = classification + (1 - dice)
//           → backward(loss · scale) → unscale
//           → clip global grad norm → RMSprop step
//           → loss scale update → per-batch record
//
// Every `validation_interval` global steps (n_train divided by
// 200 batches' worth of samples; never when that is 0) the model
// is scored on the validation loader, the score drives
// ReduceLROnPlateau, and diagnostics (learning rate, Dice,
// histograms, sample masks) go to the experiment sink. After
// each epoch: metrics row and, if enabled, a checkpoint.
//
// MemoryMode::MicroBatched trades speed for peak memory: each
// batch goes through forward/backward in slices, the slice
// gradients are summed and one optimiser step follows, so only
// one slice's activations are alive at a time.
// Validation runs on the inner backend via model.valid().
//
// Reference: Burn Book §5 (Training)

use burn::{
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{
        decay::WeightDecayConfig, GradientsAccumulator, GradientsParams, Optimizer, RmsPropConfig,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{collections::BTreeMap, sync::Arc};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batch_loader::{BatchLoader, BatchLoaderConfig},
    batcher::{SegmentationBatch, SegmentationBatcher},
};
use crate::domain::{
    record::{Histogram, LogRecord},
    sample::{MaskValue, Sample},
    traits::ExperimentSink,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    diagnostics::{gradient_histograms, sample_images, weight_histograms},
    error::{TrainError, TrainResult},
    evaluate::evaluate,
    grad_clip::clip_grad_norm,
    grad_scaler::GradScaler,
    loss::segmentation_loss,
    model::UNet,
    scheduler::{PlateauMode, ReduceLrOnPlateau},
};

/// Validation runs this many batches' worth of samples apart.
pub const VALIDATION_DIVISOR: usize = 200;

/// Scheduler patience, in validation rounds.
pub const PLATEAU_PATIENCE: usize = 5;

/// Steps between validation rounds; 0 disables validation.
pub fn validation_interval(n_train: usize, batch_size: usize) -> usize {
    n_train / (VALIDATION_DIVISOR * batch_size.max(1))
}

pub fn should_validate(global_step: usize, interval: usize) -> bool {
    interval > 0 && global_step > 0 && global_step % interval == 0
}

/// How a batch is pushed through backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    /// One forward/backward over the whole batch.
    Full,
    /// Forward/backward over slices of `size` samples, gradients summed.
    MicroBatched { size: usize },
}

/// Train/validation sources plus the mask values saved with checkpoints.
pub struct TrainingData {
    pub train:       Arc<dyn Dataset<Sample>>,
    pub val:         Arc<dyn Dataset<Sample>>,
    pub mask_values: Vec<MaskValue>,
}

/// Where a run reports to. Checkpoints and metrics are optional.
pub struct RunOutputs<'a> {
    pub sink:        &'a mut dyn ExperimentSink,
    pub checkpoints: Option<&'a CheckpointManager>,
    pub metrics:     Option<&'a MetricsLogger>,
}

pub struct TrainOutcome {
    pub global_step:   usize,
    pub last_val_dice: Option<f64>,
    pub learning_rate: f64,
}

fn emit(sink: &mut dyn ExperimentSink, record: &LogRecord) {
    if let Err(e) = sink.log(record) {
        tracing::debug!("Experiment log entry dropped: {e:#}");
    }
}

pub fn train_model<B: AutodiffBackend>(
    cfg:    &TrainConfig,
    model:  UNet<B>,
    data:   &TrainingData,
    device: &B::Device,
    memory: MemoryMode,
    out:    &mut RunOutputs<'_>,
) -> TrainResult<TrainOutcome> {
    let mut model = model;
    let n_train = data.train.len();
    let n_val   = data.val.len();

    tracing::info!(
        "Starting training:\n\
         \x20   Epochs:          {}\n\
         \x20   Batch size:      {}\n\
         \x20   Learning rate:   {}\n\
         \x20   Training size:   {}\n\
         \x20   Validation size: {}\n\
         \x20   Checkpoints:     {}\n\
         \x20   Device:          {:?}\n\
         \x20   Images scaling:  {}\n\
         \x20   Mixed Precision: {}\n\
         \x20   Memory mode:     {:?}",
        cfg.epochs, cfg.batch_size, cfg.learning_rate, n_train, n_val,
        cfg.save_checkpoint, device, cfg.img_scale, cfg.amp, memory,
    );

    // ── Loaders ───────────────────────────────────────────────────────────────
    let train_loader = BatchLoader::new(
        data.train.clone(),
        SegmentationBatcher::<B>::new(device.clone()),
        BatchLoaderConfig::new(cfg.batch_size)
            .with_shuffle(cfg.shuffle_seed)
            .with_num_workers(cfg.num_workers),
    )?;
    let val_loader = BatchLoader::new(
        data.val.clone(),
        SegmentationBatcher::<B::InnerBackend>::new(device.clone()),
        BatchLoaderConfig::new(cfg.batch_size)
            .with_drop_last(true)
            .with_num_workers(cfg.num_workers),
    )?;

    tracing::debug!(
        "{} training batches per epoch, {} validation batches per round",
        train_loader.len(),
        val_loader.len(),
    );

    // ── Optimisation state ────────────────────────────────────────────────────
    let mut optim = RmsPropConfig::new()
        .with_alpha(0.99)
        .with_epsilon(1e-8)
        .with_momentum(cfg.momentum as f32)
        .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
        .init::<B, UNet<B>>();
    let mut scheduler = ReduceLrOnPlateau::new(cfg.learning_rate, PlateauMode::Max)
        .with_patience(PLATEAU_PATIENCE);
    let mut scaler = GradScaler::new(cfg.amp);

    let interval        = validation_interval(n_train, cfg.batch_size);
    let mut global_step = 0usize;
    let mut last_val    = None;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut epoch_val = None;

        for batch in train_loader.iter(epoch as u64) {
            let batch = batch?;
            let found = batch.channels();
            if found != model.n_channels {
                return Err(TrainError::ChannelMismatch { expected: model.n_channels, found });
            }
            let SegmentationBatch { images, masks, .. } = batch;

            let validate_now = should_validate(global_step + 1, interval);
            let kept_inputs  = validate_now.then(|| (images.clone(), masks.clone()));

            let step = backward_batch(&model, images, masks, &scaler, memory, validate_now);
            let loss_value = step.loss;
            let (grads, finite) = scaler.unscale(step.grads, &model);
            let (grads, grad_norm) = clip_grad_norm(grads, &model, cfg.gradient_clipping);

            let grad_hists = if validate_now {
                gradient_histograms(&model, &grads)
            } else {
                BTreeMap::new()
            };

            if finite {
                model = optim.step(scheduler.lr(), model, grads);
            } else {
                tracing::debug!("Non-finite gradients at step {}, skipping update", global_step + 1);
            }
            scaler.update(finite);

            global_step += 1;
            loss_sum    += loss_value;
            batches     += 1;
            tracing::debug!(
                "epoch {} step {} loss={:.4} grad_norm={:.4}",
                epoch, global_step, loss_value, grad_norm,
            );
            emit(
                out.sink,
                &LogRecord::new(global_step, epoch).scalar("train loss", loss_value),
            );

            // ── Periodic validation ───────────────────────────────────────────
            if validate_now {
                let valid_model = model.valid();
                let score = evaluate(&valid_model, val_loader.iter(0))?;
                let lr    = scheduler.step(score);
                tracing::info!("Validation Dice score: {:.4}", score);
                epoch_val = Some(score);

                let mut record = LogRecord::new(global_step, epoch)
                    .scalar("learning rate", lr)
                    .scalar("validation Dice", score);
                if let (Some((images, masks)), Some(logits)) = (kept_inputs, step.logits) {
                    for (name, image) in sample_images(images, masks, logits) {
                        record = record.image(name, image);
                    }
                }
                record.histograms = collect_histograms(weight_histograms(&valid_model), grad_hists);
                emit(out.sink, &record);
            }
        }

        let avg_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        tracing::info!("Epoch {}/{} | train_loss={:.4}", epoch, cfg.epochs, avg_loss);
        if epoch_val.is_some() {
            last_val = epoch_val;
        }

        if let Some(metrics) = out.metrics {
            let row = EpochMetrics::new(epoch, avg_loss, epoch_val, scheduler.lr());
            if let Err(e) = metrics.log(&row) {
                tracing::warn!("Could not write metrics row: {e:#}");
            }
        }

        if cfg.save_checkpoint {
            if let Some(ckpt) = out.checkpoints {
                ckpt.save_epoch(&model, &data.mask_values, epoch)
                    .map_err(|e| TrainError::Checkpoint(format!("{e:#}")))?;
                tracing::info!("Checkpoint {} saved!", epoch);
            }
        }
    }

    Ok(TrainOutcome {
        global_step,
        last_val_dice: last_val,
        learning_rate: scheduler.lr(),
    })
}

/// Scaled gradients, loss value and (on request) logits of one batch.
struct BatchStep<B: AutodiffBackend> {
    grads:  GradientsParams,
    loss:   f64,
    /// Logits of the first slice, whose first sample leads the batch.
    logits: Option<Tensor<B, 4>>,
}

fn backward_batch<B: AutodiffBackend>(
    model:       &UNet<B>,
    images:      Tensor<B, 4>,
    masks:       Tensor<B, 3, Int>,
    scaler:      &GradScaler,
    memory:      MemoryMode,
    keep_logits: bool,
) -> BatchStep<B> {
    let [n, c, h, w] = images.dims();
    let slice = match memory {
        MemoryMode::Full => n,
        MemoryMode::MicroBatched { size } => size.max(1),
    };

    if slice >= n {
        let logits = model.forward(images);
        let loss   = segmentation_loss(logits.clone(), masks).total();
        let value  = loss.clone().into_scalar().elem::<f64>();
        let grads  = GradientsParams::from_grads(scaler.scale_loss(loss).backward(), model);
        return BatchStep { grads, loss: value, logits: keep_logits.then(|| logits.detach()) };
    }

    // Each slice's loss is weighted by its share of the batch so the
    // summed gradients approximate those of the whole-batch mean.
    let mut accumulator = GradientsAccumulator::<UNet<B>>::new();
    let mut value  = 0.0;
    let mut logits = None;
    for start in (0..n).step_by(slice) {
        let end    = (start + slice).min(n);
        let share  = (end - start) as f64 / n as f64;
        let out    = model.forward(images.clone().slice([start..end, 0..c, 0..h, 0..w]));
        let target = masks.clone().slice([start..end, 0..h, 0..w]);
        let loss   = segmentation_loss(out.clone(), target).total().mul_scalar(share);

        value += loss.clone().into_scalar().elem::<f64>();
        let grads = GradientsParams::from_grads(scaler.scale_loss(loss).backward(), model);
        accumulator.accumulate(model, grads);
        if keep_logits && logits.is_none() {
            logits = Some(out.detach());
        }
    }

    BatchStep { grads: accumulator.grads(), loss: value, logits }
}

fn collect_histograms(
    weights: BTreeMap<String, Histogram>,
    grads:   BTreeMap<String, Histogram>,
) -> BTreeMap<String, Histogram> {
    weights.into_iter().chain(grads).collect()
}
