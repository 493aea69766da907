// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands, `train` and `evaluate`, and their flags.
//
// The validation split is given in percent on the command
// line and converted to a fraction here, once; nothing past
// this layer sees percentages.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::data::batch_loader::default_workers;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the U-Net on images and target masks
    Train(TrainArgs),

    /// Score a saved checkpoint on the validation split
    Evaluate(EvaluateArgs),
}

/// Accept a validation percentage in [0, 100).
fn parse_percent(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if (0.0..100.0).contains(&v) {
        Ok(v)
    } else {
        Err(format!("validation percentage must be in [0, 100), got {v}"))
    }
}

/// Accept a strictly positive scale factor.
fn parse_scale(s: &str) -> Result<f64, String> {
    let v: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if v > 0.0 && v.is_finite() {
        Ok(v)
    } else {
        Err(format!("scale must be positive, got {v}"))
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Number of epochs
    #[arg(short = 'e', long, default_value_t = 5)]
    pub epochs: usize,

    /// Batch size
    #[arg(short = 'b', long = "batch-size", default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub batch_size: u64,

    /// Learning rate
    #[arg(short = 'l', long = "learning-rate", default_value_t = 1e-5)]
    pub learning_rate: f64,

    /// Load model weights from a checkpoint file
    #[arg(short = 'f', long)]
    pub load: Option<PathBuf>,

    /// Downscaling factor of the images
    #[arg(short = 's', long, default_value_t = 0.5, value_parser = parse_scale)]
    pub scale: f64,

    /// Percent of the data used as validation (0-100)
    #[arg(short = 'v', long, default_value_t = 10.0, value_parser = parse_percent)]
    pub validation: f64,

    /// Use mixed precision (dynamic loss scaling)
    #[arg(long)]
    pub amp: bool,

    /// Use bilinear upsampling
    #[arg(long)]
    pub bilinear: bool,

    /// Number of classes
    #[arg(short = 'c', long, default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    pub classes: u64,

    /// Number of image channels the network expects
    #[arg(long, default_value_t = 3)]
    pub channels: usize,

    /// Width of the first U-Net stage
    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,

    /// Directory with the input images
    #[arg(long, default_value = "data/imgs")]
    pub images_dir: PathBuf,

    /// Directory with the target masks
    #[arg(long, default_value = "data/masks")]
    pub masks_dir: PathBuf,

    /// Where checkpoints and train_config.json are written
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Where the experiment log and metrics.csv are written
    #[arg(long, default_value = "runs")]
    pub log_dir: PathBuf,

    /// Do not save a checkpoint after each epoch
    #[arg(long)]
    pub no_save_checkpoint: bool,

    /// Do not write the experiment log
    #[arg(long)]
    pub no_experiment_log: bool,

    /// Data loading worker threads (default: CPU count)
    #[arg(long)]
    pub num_workers: Option<usize>,

    /// Seed for the per-epoch shuffle of the training set
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The boundary between Layer 1 and Layer 2: the application
/// layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            images_dir:      a.images_dir,
            masks_dir:       a.masks_dir,
            checkpoint_dir:  a.checkpoint_dir,
            log_dir:         a.log_dir,
            epochs:          a.epochs,
            batch_size:      a.batch_size as usize,
            learning_rate:   a.learning_rate,
            val_fraction:    a.validation / 100.0,
            save_checkpoint: !a.no_save_checkpoint,
            img_scale:       a.scale,
            amp:             a.amp,
            n_channels:      a.channels,
            n_classes:       a.classes as usize,
            bilinear:        a.bilinear,
            base_channels:   a.base_channels,
            load:            a.load,
            num_workers:     a.num_workers.unwrap_or_else(default_workers),
            experiment_log:  !a.no_experiment_log,
            shuffle_seed:    a.seed,
            ..TrainConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory a `train` run wrote its checkpoints to
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Checkpoint to score (default: the latest epoch)
    #[arg(short = 'f', long)]
    pub checkpoint: Option<PathBuf>,
}
