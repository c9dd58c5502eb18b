// ============================================================
// Layer 6 — Prediction Files
// ============================================================
// Written every time validation accuracy reaches a new best,
// and once more at the end of training:
//
//   data/val_predictions2026-10-17_14-03-55-.csv
//     index,prediction
//     0,1
//     1,0
//
//   data/val_class_probabilities2026-10-17_14-03-55-.csv
//     index,class_0,class_1
//     0,0.120000,0.880000
//
// Rows follow dataset order: row i is entry i of the split, and an
// unreadable image stops the run instead of shifting later rows.

use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufWriter, Write},
    path::PathBuf,
};

/// Local-time stamp used in output file names.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S-").to_string()
}

pub struct PredictionWriter {
    dir: PathBuf,
}

impl PredictionWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn write_predictions(&self, stamp: &str, predictions: &[usize]) -> Result<PathBuf> {
        let path = self.dir.join(format!("val_predictions{stamp}.csv"));
        let mut f = create(&path)?;
        writeln!(f, "index,prediction")?;
        for (i, p) in predictions.iter().enumerate() {
            writeln!(f, "{i},{p}")?;
        }
        f.flush()?;
        Ok(path)
    }

    /// `probabilities` holds one row of `classes` values per sample.
    pub fn write_probabilities(&self, stamp: &str, probabilities: &[f32], classes: usize) -> Result<PathBuf> {
        let path = self.dir.join(format!("val_class_probabilities{stamp}.csv"));
        let mut f = create(&path)?;

        let header: Vec<String> = (0..classes).map(|c| format!("class_{c}")).collect();
        writeln!(f, "index,{}", header.join(","))?;
        for (i, row) in probabilities.chunks(classes.max(1)).enumerate() {
            let cells: Vec<String> = row.iter().map(|p| format!("{p:.6}")).collect();
            writeln!(f, "{i},{}", cells.join(","))?;
        }
        f.flush()?;
        Ok(path)
    }
}

fn create(path: &PathBuf) -> Result<BufWriter<fs::File>> {
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predictions_csv() {
        let tmp    = tempfile::tempdir().unwrap();
        let writer = PredictionWriter::new(tmp.path()).unwrap();
        let path   = writer.write_predictions("-test", &[2, 0, 1]).unwrap();

        assert!(path.ends_with("val_predictions-test.csv"));
        assert_eq!(fs::read_to_string(path).unwrap(), "index,prediction\n0,2\n1,0\n2,1\n");
    }

    #[test]
    fn test_probabilities_csv() {
        let tmp    = tempfile::tempdir().unwrap();
        let writer = PredictionWriter::new(tmp.path()).unwrap();
        let path   = writer.write_probabilities("", &[0.25, 0.75, 1.0, 0.0], 2).unwrap();

        assert_eq!(
            fs::read_to_string(path).unwrap(),
            "index,class_0,class_1\n0,0.250000,0.750000\n1,1.000000,0.000000\n"
        );
    }

    #[test]
    fn test_timestamp_shape() {
        let stamp = timestamp();
        // YYYY-MM-DD_HH-MM-SS-
        assert_eq!(stamp.len(), 20);
        assert!(stamp.ends_with('-'));
        assert_eq!(&stamp[10..11], "_");
    }
}
