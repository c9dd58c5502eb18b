// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe what the trainer works on:
// labelled images, the class index, and the enumerated
// options a training run can be configured with.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain structs, enums, and traits

/// Labelled images and the class index of a dataset
pub mod sample;

/// Enumerated training options (model, loss mode, pooling, ...)
pub mod options;

/// Core abstractions implemented by the data layer
pub mod traits;
