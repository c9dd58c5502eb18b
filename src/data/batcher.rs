// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Turns the items a data loader pulled out of an ImageDataset
// into the tensors one training / validation step consumes.
//
// With N images and P instances per bag:
//
//   instances        [N * P, C, S, S]   bag b owns rows b*P .. (b+1)*P
//   instance_labels  [N * P]            every instance inherits its bag label
//   bag_labels       [N]
//   indices          N dataset positions, in bag order
//
// S is the patch size when patches are enabled, otherwise the
// full image size (and P = 1).
//
// Why seed patches per image?
//   Loader workers batch in parallel and in no fixed order. Seeding
//   each image's patch RNG from (seed, dataset index) makes patch
//   placement independent of which worker got which image, so a run
//   is reproducible for any worker count.

use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    prelude::*,
    tensor::TensorData,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::data::{dataset::ImageDataset, patches::PatchSampler, BatchError};
use crate::domain::sample::ImageItem;

/// What the batcher hands back through the data loader.
pub type BatchOutcome<B> = Result<ImageBatch<B>, BatchError>;

// ─── ImageBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    pub instances:         Tensor<B, 4>,
    pub instance_labels:   Tensor<B, 1, Int>,
    pub bag_labels:        Tensor<B, 1, Int>,
    /// Dataset position of every bag
    pub indices:           Vec<usize>,
    pub bags:              usize,
    pub instances_per_bag: usize,
}

impl<B: Backend> ImageBatch<B> {
    /// Split the batch along the bag dimension into at most `towers` shards.
    ///
    /// Bags are spread as evenly as possible; the first shards get one
    /// extra bag when the count does not divide. Empty shards are never
    /// produced, so a batch of 3 bags split over 4 towers yields 3 shards.
    pub fn shard(&self, towers: usize) -> Vec<ImageBatch<B>> {
        let towers = towers.clamp(1, self.bags.max(1));
        if towers == 1 {
            return vec![self.clone()];
        }

        let p    = self.instances_per_bag;
        let base = self.bags / towers;
        let rem  = self.bags % towers;

        let mut shards = Vec::with_capacity(towers);
        let mut start  = 0;
        for t in 0..towers {
            let len = base + usize::from(t < rem);
            shards.push(ImageBatch {
                instances:         self.instances.clone().narrow(0, start * p, len * p),
                instance_labels:   self.instance_labels.clone().narrow(0, start * p, len * p),
                bag_labels:        self.bag_labels.clone().narrow(0, start, len),
                indices:           self.indices[start..start + len].to_vec(),
                bags:              len,
                instances_per_bag: p,
            });
            start += len;
        }
        shards
    }
}

// ─── ImageBatcher ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBatcher {
    /// `None` = one instance per bag (the whole image)
    patches: Option<PatchSampler>,
    /// Mixed with each image's dataset index to place its patches
    seed:    u64,
}

impl ImageBatcher {
    pub fn new(patches: Option<PatchSampler>, seed: u64) -> Self {
        Self { patches, seed }
    }

    pub fn instances_per_bag(&self) -> usize {
        self.patches.map(|p| p.count).unwrap_or(1)
    }

    fn patch_rng(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Stack `items` into an ImageBatch on `device`.
    ///
    /// Fails on an empty list, on an item whose image could not be
    /// decoded, and on a patch larger than its image.
    pub fn try_batch<B: Backend>(
        &self,
        items:  Vec<ImageItem>,
        device: &B::Device,
    ) -> BatchOutcome<B> {
        let images = items
            .into_iter()
            .map(|item| match item.image {
                Ok(image)   => Ok((item.index, image)),
                Err(reason) => Err(BatchError::Unreadable { path: item.source, reason }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (_, first) = images.first().ok_or(BatchError::Empty)?;
        let channels = first.channels;
        let side = match self.patches {
            Some(p) => p.patch_size,
            None    => first.height,
        };
        let per_bag = self.instances_per_bag();
        let bags    = images.len();
        let total   = bags * per_bag;

        let mut pixels          = Vec::with_capacity(total * channels * side * side);
        let mut instance_labels = Vec::with_capacity(total);
        let mut bag_labels      = Vec::with_capacity(bags);
        let mut indices         = Vec::with_capacity(bags);

        for (index, image) in &images {
            match self.patches {
                Some(sampler) => {
                    for patch in sampler.sample(image, &mut self.patch_rng(*index))? {
                        pixels.extend_from_slice(&patch);
                    }
                }
                None => pixels.extend_from_slice(&image.pixels),
            }
            instance_labels.extend(std::iter::repeat(image.label as i64).take(per_bag));
            bag_labels.push(image.label as i64);
            indices.push(*index);
        }

        let instances = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [total, channels, side, side]),
            device,
        );
        let instance_labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(instance_labels, [total]),
            device,
        );
        let bag_labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(bag_labels, [bags]),
            device,
        );

        Ok(ImageBatch {
            instances,
            instance_labels,
            bag_labels,
            indices,
            bags,
            instances_per_bag: per_bag,
        })
    }
}

impl<B: Backend> Batcher<B, ImageItem, BatchOutcome<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> BatchOutcome<B> {
        self.try_batch(items, device)
    }
}

/// Data loader yielding one BatchOutcome per `batch_size` items of `dataset`.
///
/// `shuffle` reorders the items with that seed. With `workers > 1`
/// batches are assembled on that many threads and arrive in completion
/// order; `ImageBatch::indices` tells where each bag came from.
pub fn image_loader<B: Backend>(
    batcher:    ImageBatcher,
    dataset:    ImageDataset,
    batch_size: usize,
    shuffle:    Option<u64>,
    workers:    usize,
    device:     &B::Device,
) -> Arc<dyn DataLoader<B, BatchOutcome<B>>> {
    let mut builder = DataLoaderBuilder::<B, ImageItem, BatchOutcome<B>>::new(batcher)
        .batch_size(batch_size.max(1))
        .set_device(device.clone());
    if let Some(seed) = shuffle {
        builder = builder.shuffle(seed);
    }
    if workers > 1 {
        builder = builder.num_workers(workers);
    }
    builder.build(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::LabeledImage;
    use burn::backend::NdArray;
    use std::path::PathBuf;

    type TestBackend = NdArray<f32>;

    fn image(label: usize, value: f32) -> LabeledImage {
        LabeledImage {
            source: PathBuf::from(format!("{label}.png")),
            label,
            channels: 3,
            height: 4,
            width: 4,
            pixels: vec![value; 3 * 16],
        }
    }

    /// Items at dataset positions 0.., one per image
    fn items(images: Vec<LabeledImage>) -> Vec<ImageItem> {
        images.into_iter().enumerate().map(|(i, img)| ImageItem::decoded(i, img)).collect()
    }

    fn int_values(t: Tensor<TestBackend, 1, Int>) -> Vec<i64> {
        t.into_data().convert::<i64>().to_vec::<i64>().unwrap()
    }

    #[test]
    fn test_whole_image_batch() {
        let device = Default::default();
        let batch  = ImageBatcher::new(None, 0)
            .try_batch::<TestBackend>(items(vec![image(0, 0.1), image(2, 0.9)]), &device)
            .unwrap();

        assert_eq!(batch.instances.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.instances_per_bag, 1);
        assert_eq!(batch.indices, vec![0, 1]);
        assert_eq!(int_values(batch.bag_labels), vec![0, 2]);
    }

    #[test]
    fn test_patch_batch_repeats_labels() {
        let device  = Default::default();
        let batcher = ImageBatcher::new(Some(PatchSampler::new(2, 3)), 0);
        let batch   = batcher
            .try_batch::<TestBackend>(
                items(vec![image(1, 0.5), image(0, 0.5), image(1, 0.5)]),
                &device,
            )
            .unwrap();

        assert_eq!(batch.instances.dims(), [9, 3, 2, 2]);
        assert_eq!(int_values(batch.instance_labels), vec![1, 1, 1, 0, 0, 0, 1, 1, 1]);
        assert_eq!(int_values(batch.bag_labels), vec![1, 0, 1]);
    }

    #[test]
    fn test_patches_depend_on_index_not_batch_order() {
        let device = Default::default();
        let ramp   = LabeledImage {
            pixels: (0..3 * 16).map(|v| v as f32).collect(),
            ..image(0, 0.0)
        };
        let item = |index| ImageItem::decoded(index, ramp.clone());
        let batcher = ImageBatcher::new(Some(PatchSampler::new(2, 4)), 11);

        // same image at position 5, batched alone and behind another item
        let alone = batcher.try_batch::<TestBackend>(vec![item(5)], &device).unwrap();
        let later = batcher.try_batch::<TestBackend>(vec![item(2), item(5)], &device).unwrap();

        let alone = alone.instances.into_data().to_vec::<f32>().unwrap();
        let later = later.instances.narrow(0, 4, 4).into_data().to_vec::<f32>().unwrap();
        assert_eq!(alone, later);
    }

    #[test]
    fn test_empty_batch_is_an_error() {
        let device = Default::default();
        let err = ImageBatcher::default().try_batch::<TestBackend>(vec![], &device).unwrap_err();
        assert_eq!(err, BatchError::Empty);
    }

    #[test]
    fn test_unreadable_item_names_the_file() {
        let device = Default::default();
        let mut batch = items(vec![image(0, 0.1)]);
        batch.push(ImageItem {
            index:  1,
            source: PathBuf::from("broken.png"),
            image:  Err("truncated file".into()),
        });

        let err = <ImageBatcher as Batcher<TestBackend, _, _>>::batch(
            &ImageBatcher::default(),
            batch,
            &device,
        )
        .unwrap_err();
        assert_eq!(
            err,
            BatchError::Unreadable { path: PathBuf::from("broken.png"), reason: "truncated file".into() }
        );
    }

    #[test]
    fn test_shard_spreads_bags() {
        let device  = Default::default();
        let images  = (0..5).map(|i| image(i, 0.0)).collect();
        let batcher = ImageBatcher::new(Some(PatchSampler::new(2, 2)), 0);
        let batch   = batcher.try_batch::<TestBackend>(items(images), &device).unwrap();

        let shards = batch.shard(2);
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].bags, 3);
        assert_eq!(shards[1].bags, 2);
        assert_eq!(shards[0].instances.dims()[0], 6);
        assert_eq!(shards[1].indices, vec![3, 4]);
        assert_eq!(int_values(shards[1].bag_labels.clone()), vec![3, 4]);
        assert_eq!(int_values(shards[1].instance_labels.clone()), vec![3, 3, 4, 4]);

        // more towers than bags: one bag per shard
        assert_eq!(batch.shard(8).len(), 5);
    }

    #[test]
    fn test_loader_covers_every_item_once() {
        use crate::data::dataset::InMemoryImageDataset;

        let device = Default::default();
        let data: ImageDataset = Arc::new(InMemoryImageDataset::new((0..7).map(|i| image(i % 2, 0.0)).collect()));

        for (shuffle, workers) in [(None, 1), (Some(3), 1), (Some(3), 2)] {
            let loader = image_loader::<TestBackend>(ImageBatcher::default(), data.clone(), 3, shuffle, workers, &device);
            let mut seen: Vec<usize> = loader
                .iter()
                .flat_map(|batch| batch.unwrap().indices)
                .collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..7).collect::<Vec<_>>());
        }
    }
}
