// ============================================================
// Layer 3 — Training Options
// ============================================================
// Every enumerated choice of a training run. Each enum is both
// a clap ValueEnum (so it can be a --flag) and serde
// (so it survives in train_config.json).

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Which residual network to build.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Resnet18,
    Resnet34,
    /// Bottleneck blocks (1x1, 3x3, 1x1) with 4x wider outputs
    Resnet50,
}

impl ModelKind {
    /// Residual blocks per stage (conv2_x .. conv5_x).
    pub fn stage_depths(self) -> Vec<usize> {
        match self {
            ModelKind::Resnet18 => vec![2, 2, 2, 2],
            ModelKind::Resnet34 | ModelKind::Resnet50 => vec![3, 4, 6, 3],
        }
    }

    pub fn bottleneck(self) -> bool {
        matches!(self, ModelKind::Resnet50)
    }
}

/// Which loss the network is trained with.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LossMode {
    /// Cross-entropy on every instance, labelled with its bag label
    Si,
    /// Cross-entropy on the pooled bag logits
    Mi,
    /// beta * SI + (1 - beta) * MI
    Combined,
}

/// How instance logits are reduced to a bag logit.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoolingKind {
    Max,
    Mean,
    /// Log-sum-exp, a smooth maximum controlled by `lse_r`
    Lse,
}

#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

/// Learning-rate schedule, keyed on the global optimizer step.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LrSchedulerKind {
    Constant,
    /// lr * rate^(step / decay_steps)
    Exponential,
    /// lr * rate^floor(step / decay_steps)
    Staircase,
}

/// Where decoded images live during training.
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    /// Decode every image once, up front
    Memory,
    /// Decode from disk every time a sample is requested
    File,
}

#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Ndarray,
    Wgpu,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_depths() {
        assert_eq!(ModelKind::Resnet18.stage_depths().iter().sum::<usize>(), 8);
        assert_eq!(ModelKind::Resnet34.stage_depths().iter().sum::<usize>(), 16);
        assert_eq!(ModelKind::Resnet50.stage_depths(), ModelKind::Resnet34.stage_depths());
        assert!(ModelKind::Resnet50.bottleneck());
        assert!(!ModelKind::Resnet34.bottleneck());
    }

    #[test]
    fn test_serde_names_match_cli_names() {
        let json = serde_json::to_string(&PoolingKind::Lse).unwrap();
        assert_eq!(json, "\"lse\"");
        let mode: LossMode = serde_json::from_str("\"combined\"").unwrap();
        assert_eq!(mode, LossMode::Combined);
        assert_eq!(
            LossMode::from_str("mi", true).unwrap(),
            LossMode::Mi,
        );
    }
}
