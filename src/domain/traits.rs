// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer only talks to these traits, so a
// different dataset layout (CSV manifest, archive, ...) can be
// plugged in without touching the training workflow.

use anyhow::Result;

use crate::domain::sample::{ImageEntry, ImageIndex, LabeledImage};

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Anything that can enumerate labelled images.
///
/// Implementations:
///   - ImageFolderLoader → `<root>/<class>/<image>` directory trees
pub trait ImageSource {
    /// Scan the source and return its class names and entries.
    fn index(&self) -> Result<ImageIndex>;
}

// ─── ImageDecoder ─────────────────────────────────────────────────────────────
/// Anything that can turn an entry into pixels.
///
/// Implementations:
///   - Preprocessor → decode + resize with the `image` crate
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, entry: &ImageEntry) -> Result<LabeledImage>;
}
