// ============================================================
// Layer 6 — Metrics
// ============================================================
// AverageMeter: running mean of a per-batch value (loss,
// accuracy). A fresh meter is used for every epoch phase.
//
// MetricsLogger: one CSV row per epoch in
// <checkpoint_dir>/metrics.csv, appended across resumed runs.
//
// Example CSV output:
//   epoch,train_loss,train_acc,val_loss,val_acc,lr,si_weight
//   1,0.912345,0.540000,0.870001,0.580000,0.001000,1.000000
//
// Why average per batch and not per image?
//   Every step's loss is already a mean over its bags, and the
//   original run summaries report the mean of those step values.
//   The last batch of an epoch may be smaller, so the two can
//   differ slightly; the per-batch mean is the one reported.
//
// Why a CSV and not the tracing log?
//   The log is for people; metrics.csv is for plotting. Opening it
//   in append mode means a resumed run continues the same curve.

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

/// Running average of the values fed to `update`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageMeter {
    /// Sum of every value seen
    sum:   f64,
    /// Number of `update` calls
    count: usize,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, value: f64) {
        self.sum   += value;
        self.count += 1;
    }

    /// Mean of all updates so far, 0 when nothing was recorded.
    pub fn average(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.sum / self.count as f64 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch:      usize,
    /// Mean step loss over the training batches
    pub train_loss: f64,
    /// Mean bag accuracy over the training batches
    pub train_acc:  f64,
    /// Loss on the whole validation set
    pub val_loss:   f64,
    /// Bag accuracy on the whole validation set
    pub val_acc:    f64,
    /// Learning rate at the end of the epoch
    pub lr:         f64,
    /// Weight of the single-instance loss term (MI weight is 1 − this)
    pub si_weight:  f64,
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    /// `<dir>/metrics.csv`
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,train_acc,val_loss,val_acc,lr,si_weight")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.train_loss,
            m.train_acc,
            m.val_loss,
            m.val_acc,
            m.lr,
            m.si_weight,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}
