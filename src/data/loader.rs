// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Scans a dataset laid out as one directory per class:
//
//   data/images/
//     benign/     img_001.png  img_002.png ...
//     malignant/  img_101.png ...
//
// Class directories are sorted by name; the position in that
// order is the class label. Files inside a class are sorted
// too, so the same directory always yields the same index.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::{DatasetError, DatasetResult};
use crate::domain::sample::{ImageEntry, ImageIndex};
use crate::domain::traits::ImageSource;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Loads the index of a `<root>/<class>/<image>` directory.
pub struct ImageFolderLoader {
    dir: PathBuf,
}

impl ImageFolderLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Scan the directory tree. Classes without any image are kept
    /// so that labels stay aligned with the directory listing.
    pub fn scan(&self) -> DatasetResult<ImageIndex> {
        if !self.dir.is_dir() {
            return Err(DatasetError::MissingDir(self.dir.clone()));
        }

        let mut class_dirs: Vec<PathBuf> = read_dir_sorted(&self.dir)?
            .into_iter()
            .filter(|p| p.is_dir())
            .collect();
        class_dirs.sort();
        if class_dirs.is_empty() {
            return Err(DatasetError::NoClasses(self.dir.clone()));
        }

        let mut classes = Vec::with_capacity(class_dirs.len());
        let mut entries = Vec::new();
        for (label, class_dir) in class_dirs.iter().enumerate() {
            let name = class_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let images: Vec<PathBuf> = read_dir_sorted(class_dir)?
                .into_iter()
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            if images.is_empty() {
                tracing::warn!("Class '{}' has no images", name);
            }
            tracing::debug!("Class {} '{}': {} images", label, name, images.len());

            entries.extend(images.into_iter().map(|p| ImageEntry::new(p, label)));
            classes.push(name);
        }

        if entries.is_empty() {
            return Err(DatasetError::NoImages(self.dir.clone()));
        }

        Ok(ImageIndex { classes, entries })
    }
}

impl ImageSource for ImageFolderLoader {
    fn index(&self) -> anyhow::Result<ImageIndex> {
        Ok(self.scan()?)
    }
}

fn read_dir_sorted(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let io_err = |source| DatasetError::Io { path: dir.to_path_buf(), source };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        paths.push(entry.map_err(io_err)?.path());
    }
    paths.sort();
    Ok(paths)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
