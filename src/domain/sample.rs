// ============================================================
// Layer 3 — Sample Domain Types
// ============================================================
// An ImageIndex is the result of scanning a dataset directory:
// the sorted class names plus one ImageEntry per file.
// A LabeledImage is an entry after decoding, stored as a
// CHW buffer of f32 values in [0, 1]. An ImageItem is what a
// dataset hands to the batcher: a LabeledImage, or the reason
// the file behind that position could not be decoded.

use std::path::PathBuf;

/// One image file on disk together with its class index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub path:  PathBuf,
    pub label: usize,
}

impl ImageEntry {
    pub fn new(path: impl Into<PathBuf>, label: usize) -> Self {
        Self { path: path.into(), label }
    }
}

/// All entries of a dataset and the class names they index into.
#[derive(Debug, Clone, Default)]
pub struct ImageIndex {
    /// Class names in label order (label `i` is `classes[i]`)
    pub classes: Vec<String>,
    pub entries: Vec<ImageEntry>,
}

impl ImageIndex {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Number of entries per class, in label order.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.classes.len()];
        for entry in &self.entries {
            if let Some(c) = counts.get_mut(entry.label) {
                *c += 1;
            }
        }
        counts
    }

    /// Re-express the labels of this index in terms of another class list.
    ///
    /// Used at evaluation time: the class order of the training run is
    /// authoritative, the evaluation directory may list a subset of it.
    /// Returns the name of the first class that is unknown to `classes`.
    pub fn remap_to(self, classes: &[String]) -> Result<ImageIndex, String> {
        let mut mapping = Vec::with_capacity(self.classes.len());
        for name in &self.classes {
            match classes.iter().position(|c| c == name) {
                Some(i) => mapping.push(i),
                None    => return Err(name.clone()),
            }
        }
        let entries = self
            .entries
            .into_iter()
            .map(|e| ImageEntry::new(e.path, mapping[e.label]))
            .collect();
        Ok(ImageIndex { classes: classes.to_vec(), entries })
    }
}

/// A decoded image in CHW layout with values in [0, 1].
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub source:   PathBuf,
    pub label:    usize,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
    pub pixels:   Vec<f32>,
}

/// What a dataset yields for one position.
///
/// Decoding can fail long after the directory was scanned (lazy
/// loading), so the outcome travels with the item and the batcher
/// decides what to do with it.
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// Position in the dataset; CSV rows are keyed on it
    pub index:  usize,
    pub source: PathBuf,
    /// The decoded image, or the decoder's error message
    pub image:  Result<LabeledImage, String>,
}

impl ImageItem {
    pub fn decoded(index: usize, image: LabeledImage) -> Self {
        Self { index, source: image.source.clone(), image: Ok(image) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ImageIndex {
        ImageIndex {
            classes: vec!["benign".into(), "malignant".into()],
            entries: vec![
                ImageEntry::new("a.png", 0),
                ImageEntry::new("b.png", 1),
                ImageEntry::new("c.png", 1),
            ],
        }
    }

    #[test]
    fn test_class_counts() {
        assert_eq!(index().class_counts(), vec![1, 2]);
    }

    #[test]
    fn test_remap_to_training_order() {
        let training = vec!["malignant".to_string(), "normal".into(), "benign".into()];
        let remapped = index().remap_to(&training).unwrap();
        let labels: Vec<usize> = remapped.entries.iter().map(|e| e.label).collect();
        assert_eq!(labels, vec![2, 0, 0]);
        assert_eq!(remapped.num_classes(), 3);
    }

    #[test]
    fn test_remap_unknown_class() {
        let training = vec!["benign".to_string()];
        assert_eq!(index().remap_to(&training).unwrap_err(), "malignant");
    }
}
