// ============================================================
// Layer 5 — Learning-Rate Schedule
// ============================================================
// lr(step) for the three schedulers, with d = decay_steps:
//
//   constant     base_lr
//   exponential  base_lr * decay_rate ^ (step / d)
//   staircase    base_lr * decay_rate ^ floor(step / d)
//
// Why key on the global step and not the epoch?
//   The step counter is persisted with the run state, so a resumed
//   run continues the curve exactly where it stopped, whatever the
//   batch size.

use crate::domain::options::LrSchedulerKind;

/// Learning rate as a function of the global optimizer step.
#[derive(Debug, Clone, Copy)]
pub struct LrSchedule {
    pub kind:        LrSchedulerKind,
    pub base_lr:     f64,
    /// Factor applied once every `decay_steps`
    pub decay_rate:  f64,
    /// Treated as 1 when 0
    pub decay_steps: usize,
}

impl LrSchedule {
    pub fn lr_at(&self, step: usize) -> f64 {
        let steps = self.decay_steps.max(1) as f64;
        match self.kind {
            LrSchedulerKind::Constant    => self.base_lr,
            LrSchedulerKind::Exponential => self.base_lr * self.decay_rate.powf(step as f64 / steps),
            LrSchedulerKind::Staircase   => self.base_lr * self.decay_rate.powf((step as f64 / steps).floor()),
        }
    }
}
