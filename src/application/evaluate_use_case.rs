// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Re-runs the validation pass of a finished (or interrupted) run:
//
//   Step 1: Load train_config.json and the training state
//   Step 2: Index the data directory with the training classes
//   Step 3: Rebuild the model and load model_best / model_last
//   Step 4: Evaluate and write the prediction CSVs

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, NdArray, Wgpu},
    prelude::Backend,
};

use crate::application::train_use_case::{build_dataset, TrainConfig};
use crate::data::{dataset::ImageDataset, loader::ImageFolderLoader, preprocessor::Preprocessor};
use crate::domain::{options::BackendKind, traits::{ImageDecoder, ImageSource}};
use crate::infra::{
    checkpoint::{CheckpointKind, CheckpointManager},
    predictions::{timestamp, PredictionWriter},
};
use crate::ml::{
    loss::LossWeights,
    trainer::{evaluate, EvalOptions, Evaluation},
};

#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub checkpoint_dir: String,
    pub data_dir:       String,
    pub output_dir:     String,
    /// Evaluate model_last instead of model_best
    pub use_last:       bool,
    /// Overrides the backend the model was trained on
    pub backend:        Option<BackendKind>,
}

pub struct EvaluateUseCase {
    config: EvaluateConfig,
}

impl EvaluateUseCase {
    pub fn new(config: EvaluateConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Evaluation> {
        let eval_cfg = &self.config;

        // ── Step 1: Saved configuration ──────────────────────────────────────
        let ckpt  = CheckpointManager::new(&eval_cfg.checkpoint_dir)?;
        let cfg   = ckpt.load_config()?;
        let epoch = ckpt.load_state()?.map(|s| s.epoch.max(1)).unwrap_or(1);
        let kind  = if eval_cfg.use_last { CheckpointKind::Last } else { CheckpointKind::Best };
        if !ckpt.has_model(kind) {
            bail!(
                "No {} checkpoint in '{}'",
                kind.stem(),
                eval_cfg.checkpoint_dir
            );
        }

        // ── Step 2: Data, labelled with the training classes ─────────────────
        let index = ImageFolderLoader::new(&eval_cfg.data_dir)
            .index()?
            .remap_to(&cfg.class_names)
            .map_err(|class| anyhow!("Class '{class}' was not part of the training data"))?;
        tracing::info!("Evaluating {} images from '{}'", index.entries.len(), eval_cfg.data_dir);

        let decoder: Arc<dyn ImageDecoder> = Arc::new(Preprocessor::new(cfg.image_size));
        let dataset = build_dataset(cfg.loader, index.entries, decoder)?;

        // ── Step 3 + 4: Model and evaluation on the selected backend ─────────
        let eval = match eval_cfg.backend.unwrap_or(cfg.backend) {
            BackendKind::Ndarray => {
                evaluate_checkpoint::<NdArray<f32>>(&cfg, &ckpt, kind, &dataset, epoch, NdArrayDevice::default())?
            }
            BackendKind::Wgpu => {
                evaluate_checkpoint::<Wgpu>(&cfg, &ckpt, kind, &dataset, epoch, WgpuDevice::default())?
            }
        };

        tracing::info!("Eval Loss: {:.6}", eval.loss);
        tracing::info!("Eval Accuracy: {:.6}", eval.accuracy);

        let writer = PredictionWriter::new(PathBuf::from(&eval_cfg.output_dir))?;
        let stamp  = timestamp();
        let preds  = writer.write_predictions(&stamp, &eval.predictions)?;
        writer.write_probabilities(&stamp, &eval.probabilities, eval.num_classes)?;
        tracing::info!("Predictions written to '{}'", preds.display());

        Ok(eval)
    }
}

fn evaluate_checkpoint<B: Backend>(
    cfg:     &TrainConfig,
    ckpt:    &CheckpointManager,
    kind:    CheckpointKind,
    dataset: &ImageDataset,
    epoch:   usize,
    device:  B::Device,
) -> Result<Evaluation> {
    let model   = ckpt.load_model(cfg.resnet_config().init::<B>(&device), kind, &device)?;
    let weights = LossWeights::for_epoch(cfg.mode, cfg.beta, cfg.beta_decay, epoch);

    evaluate(&model, dataset, &EvalOptions::new(cfg, weights), "eval-", &device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainUseCase;
    use crate::domain::options::LossMode;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_classes(root: &Path, classes: &[(&str, u8)], per_class: usize) {
        for (class, value) in classes {
            std::fs::create_dir_all(root.join(class)).unwrap();
            for i in 0..per_class {
                RgbImage::from_pixel(20, 20, Rgb([*value, *value, *value]))
                    .save(root.join(class).join(format!("{i}.png")))
                    .unwrap();
            }
        }
    }

    fn trained(tmp: &Path) -> TrainConfig {
        let data = tmp.join("images");
        write_classes(&data, &[("cat", 30), ("dog", 220)], 3);

        let cfg = TrainConfig {
            data_dir:         data.display().to_string(),
            checkpoint_dir:   tmp.join("ckpt").display().to_string(),
            summary_dir:      tmp.join("summary").display().to_string(),
            output_dir:       tmp.join("out").display().to_string(),
            base_width:       2,
            image_size:       16,
            epochs:           1,
            batch_size:       2,
            train_on_patches: true,
            patch_size:       8,
            n_random_patches: 2,
            mode:             LossMode::Combined,
            ..TrainConfig::default()
        };
        TrainUseCase::new(cfg.clone()).execute().unwrap();
        cfg
    }

    #[test]
    fn test_evaluate_last_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = trained(tmp.path());

        let eval = EvaluateUseCase::new(EvaluateConfig {
            checkpoint_dir: cfg.checkpoint_dir.clone(),
            data_dir:       cfg.data_dir.clone(),
            output_dir:     tmp.path().join("eval").display().to_string(),
            use_last:       true,
            backend:        None,
        })
        .execute()
        .unwrap();

        assert_eq!(eval.predictions.len(), 6);
        assert_eq!(eval.labels, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(eval.probabilities.len(), 6 * 2);

        let written = std::fs::read_dir(tmp.path().join("eval")).unwrap().count();
        assert_eq!(written, 2);
    }

    #[test]
    fn test_evaluate_rejects_unknown_class() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = trained(tmp.path());

        let other = tmp.path().join("other");
        write_classes(&other, &[("bird", 120)], 1);

        let result = EvaluateUseCase::new(EvaluateConfig {
            checkpoint_dir: cfg.checkpoint_dir,
            data_dir:       other.display().to_string(),
            output_dir:     tmp.path().join("eval").display().to_string(),
            use_last:       true,
            backend:        None,
        })
        .execute();

        assert!(result.is_err());
    }

    #[test]
    fn test_evaluate_without_training_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = EvaluateUseCase::new(EvaluateConfig {
            checkpoint_dir: tmp.path().join("missing").display().to_string(),
            data_dir:       tmp.path().display().to_string(),
            output_dir:     tmp.path().join("eval").display().to_string(),
            use_last:       false,
            backend:        None,
        })
        .execute();
        assert!(result.is_err());
    }
}
