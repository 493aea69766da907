// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands off to Layer 2.
//
//   1. `train`    — trains the U-Net on image/mask folders
//   2. `evaluate` — scores a saved checkpoint
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "unet-trainer",
    version,
    about = "Train the U-Net on images and target masks."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case; no work happens here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training on images in: {}", args.images_dir.display());
    let report = TrainUseCase::new(args.into()).execute()?;

    match report.last_val_dice {
        Some(dice) => println!(
            "Training complete: {} steps, last validation Dice {:.4}.",
            report.global_step, dice
        ),
        None => println!("Training complete: {} steps.", report.global_step),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.checkpoint_dir, args.checkpoint).execute()?;
    println!(
        "Validation Dice of '{}' over {} samples: {:.4}",
        report.checkpoint.display(),
        report.val_samples,
        report.dice
    );
    Ok(())
}
