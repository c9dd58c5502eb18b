// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — trains a model on folders of labelled images
//   2. `evaluate` — reloads a checkpoint and scores an image folder
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "resnet-mil",
    version = "0.1.0",
    about = "Train ResNet image classifiers with a multiple-instance-learning head."
)]
pub struct Cli {
    /// Directory for the timestamped log files
    #[arg(long, global = true, default_value = "logs")]
    pub log_dir: String,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let cfg = args.into_config()?;
    tracing::info!("Starting training on images in: {}", cfg.data_dir);

    let best = TrainUseCase::new(cfg).execute()?;

    match best.epoch {
        Some(epoch) => println!(
            "Training complete. Best validation accuracy {:.4} at epoch {epoch}.",
            best.val_accuracy
        ),
        None => println!("Training complete. No validation accuracy above 0 was reached."),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let eval = EvaluateUseCase::new(args.into()).execute()?;
    println!("\nloss: {:.4} -- acc: {:.4}", eval.loss, eval.accuracy);
    Ok(())
}
