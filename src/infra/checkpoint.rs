// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder.
//
// File layout:
//   checkpoints/
//     model_best.mpk.gz     ← weights of the best validation epoch
//     model_last.mpk.gz     ← weights after the most recent epoch
//     training_state.json   ← epoch / step counters, best record and its predictions
//     train_config.json     ← hyperparameters and class names
//
// The config is needed to rebuild the exact architecture before
// weights can be loaded into it; the state is what a resumed run
// continues counting from.

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::ResNet;

const CONFIG_FILE: &str = "train_config.json";
const STATE_FILE:  &str = "training_state.json";

/// Which of the two model snapshots to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Best,
    Last,
}

impl CheckpointKind {
    pub fn stem(self) -> &'static str {
        match self {
            CheckpointKind::Best => "model_best",
            CheckpointKind::Last => "model_last",
        }
    }
}

/// Counters and best record persisted alongside `model_last`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Last fully completed epoch (0 = none)
    pub epoch:             usize,
    /// Optimizer steps taken so far
    pub global_step:       usize,
    pub best_epoch:        Option<usize>,
    pub best_val_accuracy: f64,
    pub best_val_loss:     f64,
    /// Validation predictions of the best epoch, in dataset order
    #[serde(default)]
    pub best_predictions:  Vec<usize>,
}

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Save model weights as `kind`. The recorder appends its own extension.
    pub fn save_model<B: Backend>(&self, model: &ResNet<B>, kind: CheckpointKind) -> Result<()> {
        let path = self.dir.join(kind.stem());

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(())
    }

    /// Load weights saved as `kind` into `model`, which must have the same architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  ResNet<B>,
        kind:   CheckpointKind,
        device: &B::Device,
    ) -> Result<ResNet<B>> {
        let path = self.dir.join(kind.stem());

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Has a model been trained into this directory?",
                    path.display())
            })?;

        tracing::info!("Loaded checkpoint '{}'", path.display());
        Ok(model.load_record(record))
    }

    /// True when a snapshot of `kind` has been written to this directory.
    pub fn has_model(&self, kind: CheckpointKind) -> bool {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return false;
        };
        entries
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with(&format!("{}.", kind.stem())))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'evaluate'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config '{}'", path.display()))
    }

    pub fn save_state(&self, state: &TrainingState) -> Result<()> {
        let path = self.dir.join(STATE_FILE);
        fs::write(&path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }

    /// The persisted state, or `None` when no run has saved one yet.
    pub fn load_state(&self) -> Result<Option<TrainingState>> {
        let path = self.dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}
