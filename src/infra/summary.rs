// ============================================================
// Layer 6 — Scalar Summaries
// ============================================================
// A flat time series of (step, tag, value) rows that a plotting
// dashboard can pick up:
//
//   <summary_dir>/summaries.csv
//     step,tag,value
//     40,train/loss_per_epoch,0.812345
//     40,learning_rate,0.001000
//
// Steps are global optimizer steps, so train and test series
// of the same epoch line up.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

pub const TRAIN_LOSS:    &str = "train/loss_per_epoch";
pub const TRAIN_ACC:     &str = "train/acc_per_epoch";
pub const TEST_LOSS:     &str = "test/loss_per_epoch";
pub const TEST_ACC:      &str = "test/acc_per_epoch";
pub const LEARNING_RATE: &str = "learning_rate";
pub const SI_WEIGHT:     &str = "si_weight";
pub const MI_WEIGHT:     &str = "mi_weight";

pub struct SummaryWriter {
    path: PathBuf,
}

impl SummaryWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create summary directory '{}'", dir.display()))?;

        let path = dir.join("summaries.csv");
        if !path.exists() {
            fs::write(&path, "step,tag,value\n")
                .with_context(|| format!("Cannot create '{}'", path.display()))?;
        }
        Ok(Self { path })
    }

    /// Append one row per (tag, value) pair at `step`.
    pub fn summarize(&self, step: usize, scalars: &[(&str, f64)]) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Cannot open '{}'", self.path.display()))?;
        for (tag, value) in scalars {
            writeln!(f, "{step},{tag},{value:.6}")?;
        }
        Ok(())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_rows() {
        let tmp    = tempfile::tempdir().unwrap();
        let writer = SummaryWriter::new(tmp.path().join("summary")).unwrap();
        writer.summarize(10, &[(TRAIN_LOSS, 0.5), (LEARNING_RATE, 0.001)]).unwrap();
        writer.summarize(20, &[(TEST_ACC, 1.0)]).unwrap();

        let text = fs::read_to_string(writer.path()).unwrap();
        assert_eq!(
            text,
            "step,tag,value\n\
             10,train/loss_per_epoch,0.500000\n\
             10,learning_rate,0.001000\n\
             20,test/acc_per_epoch,1.000000\n"
        );
    }
}
