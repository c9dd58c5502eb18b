// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate the configuration
//   Step 2: Index the image folders      (Layer 4 - data)
//   Step 3: Split train/validation       (Layer 4 - data)
//   Step 4: Optionally keep a subset     (Layer 4 - data)
//   Step 5: Build datasets               (Layer 4 - data)
//   Step 6: Save config                  (Layer 6 - infra)
//   Step 7: Run training on the backend  (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use std::sync::Arc;

use anyhow::{bail, Result};
use burn::{
    backend::{
        ndarray::NdArrayDevice,
        wgpu::WgpuDevice,
        Autodiff, NdArray, Wgpu,
    },
    data::dataset::Dataset,
};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::{FileImageDataset, ImageDataset, InMemoryImageDataset},
    loader::ImageFolderLoader,
    patches::PatchSampler,
    preprocessor::Preprocessor,
    splitter::{split_train_val, take_subset},
};
use crate::domain::{
    options::{
        BackendKind, LoaderKind, LossMode, LrSchedulerKind, ModelKind, OptimizerKind, PoolingKind,
    },
    sample::ImageEntry,
    traits::{ImageDecoder, ImageSource},
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    model::ResNetConfig,
    schedule::LrSchedule,
    trainer::{run_training, BestRecord, TrainingData},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it can be loaded with --config, saved next to the
// checkpoints and reloaded by `evaluate`. Missing JSON fields fall
// back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_dir:         String,
    pub checkpoint_dir:   String,
    pub summary_dir:      String,
    pub output_dir:       String,
    pub backend:          BackendKind,
    pub loader:           LoaderKind,

    pub model:            ModelKind,
    pub base_width:       usize,
    pub image_size:       usize,
    /// Filled from the data directory; position = class index
    pub class_names:      Vec<String>,

    pub epochs:           usize,
    pub batch_size:       usize,
    pub towers:           usize,
    /// Threads assembling batches; 1 batches on the training thread
    pub num_workers:      usize,
    pub optimizer:        OptimizerKind,
    pub lr:               f64,
    pub weight_decay:     f64,
    pub momentum:         f64,
    pub lr_scheduler:     LrSchedulerKind,
    pub lr_decay_rate:    f64,
    pub lr_decay_steps:   usize,

    pub train_val_split:  f64,
    pub train_on_subset:  bool,
    pub subset_size:      usize,

    pub train_on_patches: bool,
    pub patch_size:       usize,
    pub n_random_patches: usize,

    pub mode:             LossMode,
    pub beta:             f64,
    pub beta_decay:       f64,
    pub pooling:          PoolingKind,
    pub lse_r:            f64,

    pub seed:             u64,
    pub save_models:      bool,
    pub resume:           bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:         "data/images".to_string(),
            checkpoint_dir:   "checkpoints".to_string(),
            summary_dir:      "summaries".to_string(),
            output_dir:       "data".to_string(),
            backend:          BackendKind::Ndarray,
            loader:           LoaderKind::Memory,

            model:            ModelKind::Resnet18,
            base_width:       64,
            image_size:       224,
            class_names:      Vec::new(),

            epochs:           50,
            batch_size:       16,
            towers:           1,
            num_workers:      1,
            optimizer:        OptimizerKind::Adam,
            lr:               1e-3,
            weight_decay:     0.0,
            momentum:         0.9,
            lr_scheduler:     LrSchedulerKind::Constant,
            lr_decay_rate:    0.96,
            lr_decay_steps:   1000,

            train_val_split:  0.8,
            train_on_subset:  false,
            subset_size:      100,

            train_on_patches: false,
            patch_size:       64,
            n_random_patches: 8,

            mode:             LossMode::Mi,
            beta:             0.5,
            beta_decay:       0.9,
            pooling:          PoolingKind::Max,
            lse_r:            5.0,

            seed:             42,
            save_models:      true,
            resume:           false,
        }
    }
}

impl TrainConfig {
    /// Reject settings the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.towers == 0 {
            bail!("towers must be at least 1");
        }
        if !(self.train_val_split > 0.0 && self.train_val_split <= 1.0) {
            bail!("train_val_split must be in (0, 1], got {}", self.train_val_split);
        }
        if self.image_size == 0 || self.base_width == 0 {
            bail!("image_size and base_width must be positive");
        }
        if self.train_on_patches {
            if self.patch_size == 0 || self.patch_size > self.image_size {
                bail!(
                    "patch_size {} must be between 1 and image_size {}",
                    self.patch_size, self.image_size
                );
            }
            if self.n_random_patches == 0 {
                bail!("n_random_patches must be at least 1");
            }
        }
        if !(0.0..=1.0).contains(&self.beta) {
            bail!("beta must be in [0, 1], got {}", self.beta);
        }
        if self.lr <= 0.0 {
            bail!("lr must be positive, got {}", self.lr);
        }
        if self.pooling == PoolingKind::Lse && self.lse_r <= 0.0 {
            bail!("lse_r must be positive, got {}", self.lse_r);
        }
        Ok(())
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    pub fn resnet_config(&self) -> ResNetConfig {
        ResNetConfig::new(self.num_classes(), self.model.stage_depths())
            .with_base_width(self.base_width)
            .with_bottleneck(self.model.bottleneck())
    }

    /// Side length of one network input: a patch, or the whole resized image.
    pub fn input_size(&self) -> usize {
        if self.train_on_patches { self.patch_size } else { self.image_size }
    }

    pub fn patch_sampler(&self) -> Option<PatchSampler> {
        self.train_on_patches
            .then(|| PatchSampler::new(self.patch_size, self.n_random_patches))
    }

    pub fn lr_schedule(&self) -> LrSchedule {
        LrSchedule {
            kind:        self.lr_scheduler,
            base_lr:     self.lr,
            decay_rate:  self.lr_decay_rate,
            decay_steps: self.lr_decay_steps,
        }
    }

    pub fn log_hyperparameters(&self) {
        tracing::info!("Data Directory Path: {}", self.data_dir);
        tracing::info!("Summary Directory Path: {}", self.summary_dir);
        tracing::info!("Checkpoint Path: {}", self.checkpoint_dir);
        tracing::info!("Backend: {:?}", self.backend);
        tracing::info!("Type of DataLoader: {:?}", self.loader);
        tracing::info!("Type of Model: {:?} (base width {})", self.model, self.base_width);
        tracing::info!("Image size: {}", self.image_size);
        tracing::info!("Number of Epochs: {}", self.epochs);
        tracing::info!("Optimizer Type: {:?}", self.optimizer);
        tracing::info!(
            "Optimizer parameters: lr={} weight_decay={} momentum={}",
            self.lr, self.weight_decay, self.momentum
        );
        tracing::info!("Scheduler Type: {:?}", self.lr_scheduler);
        tracing::info!(
            "Scheduler parameters: decay_rate={} decay_steps={}",
            self.lr_decay_rate, self.lr_decay_steps
        );
        tracing::info!("Train/Validation split ratio: {}", self.train_val_split);
        tracing::info!("Batch size: {} over {} tower(s)", self.batch_size, self.towers);
        tracing::info!("Batching threads: {}", self.num_workers);
        tracing::info!("Training on Subset of the data: {}", self.train_on_subset);
        tracing::info!("Training on Subset of size: {}", self.subset_size);
        tracing::info!("Generating Patches: {}", self.train_on_patches);
        tracing::info!("Patch size (square): {}", self.patch_size);
        tracing::info!("Number of Patches: {}", self.n_random_patches);
        tracing::info!("Mode for network architecture and loss: {:?}", self.mode);
        tracing::info!("Initial single instance weight for combined loss: {}", self.beta);
        tracing::info!("Decay rate of the single instance weight: {}", self.beta_decay);
        tracing::info!("Pooling type used for multiple instance pooling: {:?}", self.pooling);
        tracing::info!("Seed: {}", self.seed);
    }
}

/// Wrap `entries` in the dataset kind selected by `loader`.
///
/// The in-memory loader decodes everything here and fails on the first
/// unreadable image; the file loader fails later, in the batch holding it.
pub fn build_dataset(
    loader:  LoaderKind,
    entries: Vec<ImageEntry>,
    decoder: Arc<dyn ImageDecoder>,
) -> Result<ImageDataset> {
    Ok(match loader {
        LoaderKind::Memory => Arc::new(InMemoryImageDataset::decode_all(&entries, decoder.as_ref())?),
        LoaderKind::File   => Arc::new(FileImageDataset::new(entries, decoder)),
    })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<BestRecord> {
        let mut cfg = self.config.clone();

        // ── Step 1: Validate the configuration ───────────────────────────────
        cfg.validate()?;
        cfg.log_hyperparameters();

        // ── Step 2: Index the class folders ──────────────────────────────────
        tracing::info!("Indexing images in '{}'", cfg.data_dir);
        let index = ImageFolderLoader::new(&cfg.data_dir).index()?;
        tracing::info!("Found {} classes", index.num_classes());
        for (name, count) in index.classes.iter().zip(index.class_counts()) {
            tracing::info!("Class '{}': {} images", name, count);
        }
        cfg.class_names = index.classes.clone();

        // ── Step 3: Train / validation split ─────────────────────────────────
        let (train_entries, val_entries) = split_train_val(index.entries, cfg.train_val_split, cfg.seed);

        // ── Step 4: Subset of the training data ──────────────────────────────
        let train_entries = if cfg.train_on_subset {
            take_subset(train_entries, cfg.subset_size)
        } else {
            train_entries
        };
        tracing::info!(
            "Split: {} train, {} validation",
            train_entries.len(),
            val_entries.len()
        );

        // ── Step 5: Build datasets ───────────────────────────────────────────
        let decoder: Arc<dyn ImageDecoder> = Arc::new(Preprocessor::new(cfg.image_size));
        let data = TrainingData {
            train: build_dataset(cfg.loader, train_entries, decoder.clone())?,
            val:   build_dataset(cfg.loader, val_entries, decoder)?,
        };
        if data.train.is_empty() {
            bail!("No training images could be loaded from '{}'", cfg.data_dir);
        }

        // ── Step 6: Save config for evaluation and resume ────────────────────
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir)?;
        if cfg.resume {
            if let Ok(saved) = ckpt.load_config() {
                if saved.class_names != cfg.class_names {
                    bail!(
                        "Cannot resume: checkpoint classes {:?} differ from data classes {:?}",
                        saved.class_names, cfg.class_names
                    );
                }
            }
        }
        ckpt.save_config(&cfg)?;

        // ── Step 7: Run the training loop on the selected backend ────────────
        let best = match cfg.backend {
            BackendKind::Ndarray => {
                run_training::<Autodiff<NdArray<f32>>>(&cfg, data, ckpt, NdArrayDevice::default())?
            }
            BackendKind::Wgpu => {
                run_training::<Autodiff<Wgpu>>(&cfg, data, ckpt, WgpuDevice::default())?
            }
        };

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_image(path: &Path, value: u8) {
        RgbImage::from_pixel(20, 20, Rgb([value, value, value])).save(path).unwrap();
    }

    #[test]
    fn test_default_config_is_valid() {
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let base = TrainConfig::default();
        assert!(TrainConfig { batch_size: 0, ..base.clone() }.validate().is_err());
        assert!(TrainConfig { towers: 0, ..base.clone() }.validate().is_err());
        assert!(TrainConfig { train_val_split: 0.0, ..base.clone() }.validate().is_err());
        assert!(TrainConfig { train_val_split: 1.5, ..base.clone() }.validate().is_err());
        assert!(TrainConfig { beta: 1.5, ..base.clone() }.validate().is_err());
        assert!(TrainConfig { lr: 0.0, ..base.clone() }.validate().is_err());
        assert!(TrainConfig {
            train_on_patches: true,
            patch_size: 300,
            ..base.clone()
        }
        .validate()
        .is_err());
        // patch size only matters when patches are on
        assert!(TrainConfig { patch_size: 300, ..base }.validate().is_ok());
    }

    #[test]
    fn test_input_size_follows_patches() {
        let cfg = TrainConfig { image_size: 100, patch_size: 32, ..TrainConfig::default() };
        assert_eq!(cfg.input_size(), 100);
        assert!(cfg.patch_sampler().is_none());

        let cfg = TrainConfig { train_on_patches: true, ..cfg };
        assert_eq!(cfg.input_size(), 32);
        assert_eq!(cfg.patch_sampler(), Some(PatchSampler::new(32, 8)));
    }

    #[test]
    fn test_config_json_fills_missing_fields() {
        let cfg: TrainConfig = serde_json::from_str(r#"{"epochs": 3, "mode": "combined"}"#).unwrap();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.mode, LossMode::Combined);
        assert_eq!(cfg.batch_size, TrainConfig::default().batch_size);
    }

    #[test]
    fn test_execute_trains_on_image_folders() {
        let tmp  = tempfile::tempdir().unwrap();
        let data = tmp.path().join("images");
        for (class, value) in [("cat", 30u8), ("dog", 220u8)] {
            std::fs::create_dir_all(data.join(class)).unwrap();
            for i in 0..3 {
                write_image(&data.join(class).join(format!("{i}.png")), value);
            }
        }

        let cfg = TrainConfig {
            data_dir:       data.display().to_string(),
            checkpoint_dir: tmp.path().join("ckpt").display().to_string(),
            summary_dir:    tmp.path().join("summary").display().to_string(),
            output_dir:     tmp.path().join("out").display().to_string(),
            loader:         LoaderKind::File,
            base_width:     2,
            image_size:     16,
            epochs:         1,
            batch_size:     2,
            ..TrainConfig::default()
        };
        TrainUseCase::new(cfg.clone()).execute().unwrap();

        let saved = CheckpointManager::new(&cfg.checkpoint_dir).unwrap().load_config().unwrap();
        assert_eq!(saved.class_names, vec!["cat".to_string(), "dog".to_string()]);
    }
}
