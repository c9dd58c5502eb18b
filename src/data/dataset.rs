use std::sync::Arc;

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;

use crate::domain::sample::{ImageEntry, ImageItem, LabeledImage};
use crate::domain::traits::ImageDecoder;

/// Shared handle the data loaders read from, whichever loader produced it.
pub type ImageDataset = Arc<dyn Dataset<ImageItem>>;

/// Every image decoded once, up front.
#[derive(Debug)]
pub struct InMemoryImageDataset {
    images: Vec<LabeledImage>,
}

impl InMemoryImageDataset {
    /// Decode all entries, stopping at the first image that cannot be read.
    pub fn decode_all(entries: &[ImageEntry], decoder: &dyn ImageDecoder) -> Result<Self> {
        let images = entries
            .iter()
            .map(|entry| {
                decoder
                    .decode(entry)
                    .with_context(|| format!("Cannot decode image {}", entry.path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("Decoded {} images", images.len());
        Ok(Self { images })
    }

    pub fn new(images: Vec<LabeledImage>) -> Self {
        Self { images }
    }
}

impl Dataset<ImageItem> for InMemoryImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let image = self.images.get(index)?;
        Some(ImageItem::decoded(index, image.clone()))
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

/// Entries decoded from disk on every access.
///
/// A file that fails to decode still yields an item (carrying the
/// error), so positions never shift and the batcher can name the file.
pub struct FileImageDataset {
    entries: Vec<ImageEntry>,
    decoder: Arc<dyn ImageDecoder>,
}

impl FileImageDataset {
    pub fn new(entries: Vec<ImageEntry>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self { entries, decoder }
    }
}

impl Dataset<ImageItem> for FileImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        let entry = self.entries.get(index)?;
        let image = self.decoder.decode(entry).map_err(|e| format!("{e:#}"));
        Some(ImageItem { index, source: entry.path.clone(), image })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::path::PathBuf;

    /// Decodes to a 1x1 image whose only pixel is the label; fails for label 9.
    struct FakeDecoder;

    impl ImageDecoder for FakeDecoder {
        fn decode(&self, entry: &ImageEntry) -> anyhow::Result<LabeledImage> {
            if entry.label == 9 {
                bail!("corrupt");
            }
            Ok(LabeledImage {
                source: entry.path.clone(),
                label: entry.label,
                channels: 1,
                height: 1,
                width: 1,
                pixels: vec![entry.label as f32],
            })
        }
    }

    fn entries() -> Vec<ImageEntry> {
        vec![ImageEntry::new("a", 1), ImageEntry::new("b", 9), ImageEntry::new("c", 2)]
    }

    #[test]
    fn test_in_memory_fails_on_unreadable_image() {
        let err = InMemoryImageDataset::decode_all(&entries(), &FakeDecoder).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot decode image b"));
    }

    #[test]
    fn test_in_memory_items_carry_position() {
        let ok = vec![ImageEntry::new("a", 1), ImageEntry::new("c", 2)];
        let ds = InMemoryImageDataset::decode_all(&ok, &FakeDecoder).unwrap();
        assert_eq!(ds.len(), 2);

        let item = ds.get(1).unwrap();
        assert_eq!(item.index, 1);
        assert_eq!(item.source, PathBuf::from("c"));
        assert_eq!(item.image.unwrap().label, 2);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_file_dataset_keeps_failed_positions() {
        let ds = FileImageDataset::new(entries(), Arc::new(FakeDecoder));
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get(0).unwrap().image.unwrap().pixels, vec![1.0]);

        let broken = ds.get(1).unwrap();
        assert_eq!(broken.index, 1);
        assert_eq!(broken.source, PathBuf::from("b"));
        assert_eq!(broken.image.unwrap_err(), "corrupt");

        assert_eq!(ds.get(2).unwrap().index, 2);
        assert!(ds.get(3).is_none());
    }
}
