// ============================================================
// Layer 4 — Patch Sampler
// ============================================================
// Multiple-instance learning treats an image as a *bag* of
// instances. Here an instance is a random square crop:
//
//   image (C x H x W) ──▶ [patch_1, ..., patch_n]  each C x p x p
//
// Every patch inherits the label of its image. When patches are
// disabled a bag holds exactly one instance: the whole image.

use rand::Rng;

use crate::data::BatchError;
use crate::domain::sample::LabeledImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchSampler {
    /// Side length of each square patch
    pub patch_size: usize,
    /// Patches cut from every image
    pub count: usize,
}

impl PatchSampler {
    pub fn new(patch_size: usize, count: usize) -> Self {
        Self { patch_size, count }
    }

    /// Cut `count` random patches out of `image`, each flattened as CHW.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        image: &LabeledImage,
        rng:   &mut R,
    ) -> Result<Vec<Vec<f32>>, BatchError> {
        let p = self.patch_size;
        if p == 0 || p > image.height || p > image.width {
            return Err(BatchError::PatchTooLarge {
                path:   image.source.clone(),
                patch:  p,
                height: image.height,
                width:  image.width,
            });
        }

        let patches = (0..self.count)
            .map(|_| {
                let top  = rng.gen_range(0..=image.height - p);
                let left = rng.gen_range(0..=image.width - p);
                crop(image, top, left, p)
            })
            .collect();
        Ok(patches)
    }
}

/// Copy the `size x size` window starting at (`top`, `left`) out of every channel.
pub fn crop(image: &LabeledImage, top: usize, left: usize, size: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(image.channels * size * size);
    for c in 0..image.channels {
        for y in top..top + size {
            let row = (c * image.height + y) * image.width;
            out.extend_from_slice(&image.pixels[row + left..row + left + size]);
        }
    }
    out
}
