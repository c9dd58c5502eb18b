// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an image directory to tensor batches:
//
//   <data_dir>/<class>/<image>
//       │
//       ▼
//   ImageFolderLoader → scans class directories, builds ImageIndex
//       │
//       ▼
//   split_train_val   → seeded shuffle + split, optional subset
//       │
//       ▼
//   Preprocessor      → decodes, resizes, converts to CHW f32
//       │
//       ▼
//   ImageDataset      → Burn Dataset of ImageItems (in memory or lazily from disk)
//       │
//       ▼
//   DataLoader        → Burn loader: shuffle, batch size, worker threads
//       │
//       ▼
//   PatchSampler      → cuts each image into a bag of random patches
//       │
//       ▼
//   ImageBatcher      → Burn Batcher stacking bags into instance / label tensors

use std::path::PathBuf;
use thiserror::Error;

/// Scans `<root>/<class>/<image>` trees
pub mod loader;

/// Decodes and resizes images
pub mod preprocessor;

/// Random square patches (MIL instances)
pub mod patches;

/// Burn Dataset implementations
pub mod dataset;

/// Turns decoded images into tensor batches
pub mod batcher;

/// Seeded train/validation split and subsetting
pub mod splitter;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset directory {0} does not exist")]
    MissingDir(PathBuf),
    #[error("no class directories found under {0}")]
    NoClasses(PathBuf),
    #[error("no images found under {0}")]
    NoImages(PathBuf),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Why a list of dataset items could not become a batch.
///
/// Batchers run on loader worker threads and hand their outcome back
/// through a channel, so this error is `Clone` and carries the reason
/// as text instead of the original source error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("cannot build a batch from zero samples")]
    Empty,
    #[error("image {path} could not be read: {reason}")]
    Unreadable {
        path:   PathBuf,
        reason: String,
    },
    #[error("patch size {patch} does not fit into the {height}x{width} image {path}")]
    PatchTooLarge {
        path:   PathBuf,
        patch:  usize,
        height: usize,
        width:  usize,
    },
}
