// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the trainer and the use cases:
//
//   checkpoint.rs   — model_best / model_last weights through
//                     Burn's CompactRecorder, plus the training
//                     config and the resumable run state as JSON
//
//   metrics.rs      — Running averages and the per-epoch
//                     metrics.csv
//
//   summary.rs      — Scalar time series (step, tag, value)
//                     for plotting loss and accuracy curves
//
//   predictions.rs  — Timestamped CSVs of validation
//                     predictions and class probabilities
//
//   progress.rs     — Throttled per-phase progress lines
//                     (epoch-N- / Val-N-)
//
//   logging.rs      — tracing subscriber writing to stdout
//                     and a timestamped log file
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint and training state persistence
pub mod checkpoint;

/// Average meters and the metrics CSV
pub mod metrics;

/// Scalar summaries
pub mod summary;

/// Prediction and probability CSV writers
pub mod predictions;

/// Progress lines for training and validation phases
pub mod progress;

/// Log subscriber setup
pub mod logging;
