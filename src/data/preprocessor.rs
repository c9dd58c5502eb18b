// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Decodes one image file into the layout the network expects:
//
//   file ──image::open──▶ DynamicImage
//        ──resize_exact──▶ size x size (Triangle filter)
//        ──to_rgb8──────▶ HWC u8
//        ──transpose────▶ CHW f32, value / 255
//
// Every image is forced to RGB, so grayscale or RGBA files can
// be mixed freely inside one dataset.

use image::{imageops::FilterType, RgbImage};

use crate::data::{DatasetError, DatasetResult};
use crate::domain::sample::{ImageEntry, LabeledImage};
use crate::domain::traits::ImageDecoder;

pub const CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    /// Square side length every image is resized to
    size: u32,
}

impl Preprocessor {
    pub fn new(size: usize) -> Self {
        Self { size: size as u32 }
    }

    /// Decode and resize the file behind `entry`.
    pub fn load(&self, entry: &ImageEntry) -> DatasetResult<LabeledImage> {
        let img = image::open(&entry.path).map_err(|source| DatasetError::Decode {
            path: entry.path.clone(),
            source,
        })?;
        let rgb = img
            .resize_exact(self.size, self.size, FilterType::Triangle)
            .to_rgb8();
        Ok(self.from_rgb(entry, &rgb))
    }

    /// Convert an already decoded RGB image (any size) into a sample.
    pub fn from_rgb(&self, entry: &ImageEntry, rgb: &RgbImage) -> LabeledImage {
        let (width, height) = (rgb.width() as usize, rgb.height() as usize);
        let plane = width * height;
        let mut pixels = vec![0.0f32; CHANNELS * plane];

        for (x, y, px) in rgb.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..CHANNELS {
                pixels[c * plane + offset] = px.0[c] as f32 / 255.0;
            }
        }

        LabeledImage {
            source: entry.path.clone(),
            label: entry.label,
            channels: CHANNELS,
            height,
            width,
            pixels,
        }
    }
}

impl ImageDecoder for Preprocessor {
    fn decode(&self, entry: &ImageEntry) -> anyhow::Result<LabeledImage> {
        Ok(self.load(entry)?)
    }
}
