// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds, differentiates or steps a network
// lives here. The data layer hands over plain pixel buffers
// (through the batcher) and gets nothing Burn-specific back.
//
//   model.rs     — ResNet-18/34: 7x7 stem, residual stages,
//                  global average pool, fully connected head,
//                  plus FLOP / weight accounting
//
//   mil.rs       — Multiple-instance pooling of patch logits
//                  into one bag logit row per image
//                  (max, mean, log-sum-exp)
//
//   loss.rs      — Single-instance, multi-instance and
//                  combined cross-entropy; bag accuracy
//
//   schedule.rs  — Learning rate as a function of the
//                  global step
//
//   trainer.rs   — Epoch loop: tower-averaged steps,
//                  validation, best-model bookkeeping,
//                  resume, and the standalone evaluation pass
//
// Reference: He et al. (2016) Deep Residual Learning
//            Burn Book §3 (Building Blocks), §5 (Training)

/// ResNet architecture and complexity accounting
pub mod model;

/// Bag pooling over instance logits
pub mod mil;

/// Loss composition and accuracy
pub mod loss;

/// Learning-rate schedules
pub mod schedule;

/// Training loop with validation and checkpointing
pub mod trainer;
