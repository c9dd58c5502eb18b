// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a seeded RNG and splits them into
//   - a training set:   used to update model weights
//   - a validation set: used to pick the best checkpoint
//
// The seed makes the split reproducible, so a resumed run
// validates on exactly the same images as the first run.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Why split entries and not decoded images?
//   The split happens before any decoding, so the file loader
//   never has to touch the images of the other side, and the
//   in-memory loader decodes each image exactly once.
//
// Why take the subset after the split?
//   The validation set stays the same size whether or not the
//   run trains on a subset, so accuracies of both kinds of runs
//   can be compared directly.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// `train_fraction` is the share kept for training, e.g. 0.8 = 80%.
/// The split index is `round(len * train_fraction)`, clamped to `len`.
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    // After this: samples = [0..split_at], val = [split_at..total]
    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}

/// Keep only the first `size` samples (after the shuffle above this is a random subset).
pub fn take_subset<T>(mut samples: Vec<T>, size: usize) -> Vec<T> {
    if samples.len() > size {
        tracing::debug!("Training on a subset of {} / {} samples", size, samples.len());
        samples.truncate(size);
    }
    samples
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val)      = split_train_val(items, 0.8, 42);
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (train, val)      = split_train_val(items, 0.7, 1);
        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let (a, _) = split_train_val((0..30).collect::<Vec<usize>>(), 0.5, 9);
        let (b, _) = split_train_val((0..30).collect::<Vec<usize>>(), 0.5, 9);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val)      = split_train_val(items, 0.8, 0);
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    #[test]
    fn test_full_training_split() {
        let items: Vec<usize> = (0..10).collect();
        let (train, val)      = split_train_val(items, 1.0, 0);
        assert_eq!(train.len(), 10);
        assert!(val.is_empty());
    }

    #[test]
    fn test_take_subset() {
        assert_eq!(take_subset(vec![1, 2, 3, 4], 2), vec![1, 2]);
        assert_eq!(take_subset(vec![1, 2], 5), vec![1, 2]);
    }
}
