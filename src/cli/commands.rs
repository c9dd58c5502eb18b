// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`,
// and all their configurable flags.
//
// `train` starts from TrainConfig::default(), or from a JSON file
// given with --config, and applies every flag the user passed on
// top of it.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::fs;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::application::{evaluate_use_case::EvaluateConfig, train_use_case::TrainConfig};
use crate::domain::options::{
    BackendKind, LoaderKind, LossMode, LrSchedulerKind, ModelKind, OptimizerKind, PoolingKind,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a ResNet (optionally with a multiple-instance head) on image folders
    Train(TrainArgs),

    /// Evaluate a saved checkpoint on an image folder
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
/// Flags left out keep the value from --config (or the default).
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// JSON file with a full or partial training configuration
    #[arg(long)]
    pub config: Option<String>,

    /// Directory with one sub-directory of images per class
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Where model_best / model_last and the run state are saved
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    /// Where summaries.csv is appended
    #[arg(long)]
    pub summary_dir: Option<String>,

    /// Where prediction and probability CSVs are written
    #[arg(long)]
    pub output_dir: Option<String>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    #[arg(long, value_enum)]
    pub loader: Option<LoaderKind>,

    #[arg(long, value_enum)]
    pub model: Option<ModelKind>,

    /// Filters of the first residual stage; later stages double it
    #[arg(long)]
    pub base_width: Option<usize>,

    /// Images are resized to image_size x image_size
    #[arg(long)]
    pub image_size: Option<usize>,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Shards per batch whose gradients are averaged before each step
    #[arg(long)]
    pub towers: Option<usize>,

    /// Threads assembling batches
    #[arg(long)]
    pub num_workers: Option<usize>,

    #[arg(long, value_enum)]
    pub optimizer: Option<OptimizerKind>,

    #[arg(long)]
    pub lr: Option<f64>,

    #[arg(long)]
    pub weight_decay: Option<f64>,

    /// SGD momentum; 0 disables it
    #[arg(long)]
    pub momentum: Option<f64>,

    #[arg(long, value_enum)]
    pub lr_scheduler: Option<LrSchedulerKind>,

    #[arg(long)]
    pub lr_decay_rate: Option<f64>,

    #[arg(long)]
    pub lr_decay_steps: Option<usize>,

    /// Fraction of the images used for training, the rest validates
    #[arg(long)]
    pub train_val_split: Option<f64>,

    /// Keep only the first --subset-size training images
    #[arg(long)]
    pub train_on_subset: bool,

    #[arg(long)]
    pub subset_size: Option<usize>,

    /// Cut random square patches out of each image
    #[arg(long)]
    pub train_on_patches: bool,

    #[arg(long)]
    pub patch_size: Option<usize>,

    #[arg(long)]
    pub n_random_patches: Option<usize>,

    #[arg(long, value_enum)]
    pub mode: Option<LossMode>,

    /// Initial single-instance weight of the combined loss
    #[arg(long)]
    pub beta: Option<f64>,

    /// Per-epoch decay of the single-instance weight
    #[arg(long)]
    pub beta_decay: Option<f64>,

    #[arg(long, value_enum)]
    pub pooling: Option<PoolingKind>,

    /// Sharpness of log-sum-exp pooling
    #[arg(long)]
    pub lse_r: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Do not write model_best / model_last
    #[arg(long)]
    pub no_save_models: bool,

    /// Continue from model_last and training_state.json
    #[arg(long)]
    pub resume: bool,
}

impl TrainArgs {
    /// Layer the flags over the --config file (or the defaults).
    pub fn into_config(self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config file '{path}'"))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Malformed config file '{path}'"))?
            }
            None => TrainConfig::default(),
        };

        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $( if let Some(value) = self.$field { cfg.$field = value; } )*
            };
        }
        apply!(
            data_dir, checkpoint_dir, summary_dir, output_dir, backend, loader,
            model, base_width, image_size, epochs, batch_size, towers, num_workers,
            optimizer, lr, weight_decay, momentum, lr_scheduler, lr_decay_rate,
            lr_decay_steps, train_val_split, subset_size, patch_size,
            n_random_patches, mode, beta, beta_decay, pooling, lse_r, seed,
        );

        cfg.train_on_subset  |= self.train_on_subset;
        cfg.train_on_patches |= self.train_on_patches;
        cfg.resume           |= self.resume;
        if self.no_save_models {
            cfg.save_models = false;
        }
        Ok(cfg)
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory with one sub-directory of images per class
    #[arg(long)]
    pub data_dir: String,

    /// Directory a training run saved its checkpoints to
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value = "data")]
    pub output_dir: String,

    /// Use model_last instead of model_best
    #[arg(long)]
    pub last: bool,

    /// Run on a different backend than the one used for training
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            checkpoint_dir: a.checkpoint_dir,
            data_dir:       a.data_dir,
            output_dir:     a.output_dir,
            use_last:       a.last,
            backend:        a.backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_args(argv: &[&str]) -> TrainArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Train(args) => args,
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let cfg = train_args(&[
            "resnet-mil", "train", "--epochs", "3", "--mode", "combined",
            "--pooling", "lse", "--train-on-patches", "--no-save-models",
            "--model", "resnet50", "--num-workers", "4",
        ])
        .into_config()
        .unwrap();

        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.mode, LossMode::Combined);
        assert_eq!(cfg.pooling, PoolingKind::Lse);
        assert!(cfg.train_on_patches);
        assert!(!cfg.save_models);
        assert_eq!(cfg.model, ModelKind::Resnet50);
        assert_eq!(cfg.num_workers, 4);
        assert_eq!(cfg.batch_size, TrainConfig::default().batch_size);
    }

    #[test]
    fn test_flags_override_config_file() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.json");
        std::fs::write(&path, r#"{"epochs": 7, "lr": 0.01, "optimizer": "sgd"}"#).unwrap();

        let cfg = train_args(&["resnet-mil", "train", "--config", path.to_str().unwrap(), "--lr", "0.5"])
            .into_config()
            .unwrap();

        assert_eq!(cfg.epochs, 7);
        assert_eq!(cfg.lr, 0.5);
        assert_eq!(cfg.optimizer, OptimizerKind::Sgd);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = TrainArgs { config: Some("/nonexistent/run.json".into()), ..TrainArgs::default() };
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_evaluate_args() {
        let cli = Cli::try_parse_from(["resnet-mil", "evaluate", "--data-dir", "imgs", "--last"]).unwrap();
        let Commands::Evaluate(args) = cli.command else { panic!("expected evaluate") };
        let cfg: EvaluateConfig = args.into();
        assert_eq!(cfg.data_dir, "imgs");
        assert_eq!(cfg.checkpoint_dir, "checkpoints");
        assert!(cfg.use_last);
    }
}
