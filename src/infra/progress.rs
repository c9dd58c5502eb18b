// ============================================================
// Layer 6 — Phase Progress
// ============================================================
// Reports how far a training or validation phase has got:
//
//   epoch-3-: 128/512 images (25%) batches=8 elapsed=4.1s rate=31.2 img/s
//   Val-3-: 64/64 images (100%) batches=4 elapsed=0.9s rate=71.1 img/s
//
// A line is emitted whenever `every_images` more images were
// processed or `every_secs` passed since the last line, and
// always once the phase is complete.

use std::time::{Duration, Instant};

const DEFAULT_EVERY: Duration = Duration::from_secs(30);

pub struct ProgressLog {
    /// `epoch-N-` for training, `Val-N-` for validation
    prefix:       String,
    /// Images in the whole phase
    total:        usize,
    done:         usize,
    batches:      usize,
    /// Images between two lines; 0 logs only on time and completion
    every_images: usize,
    every:        Duration,
    started:      Instant,
    last_log:     Instant,
    last_done:    usize,
}

impl ProgressLog {
    /// Log about every tenth of the phase, and at least every 30 s.
    pub fn new(prefix: impl Into<String>, total: usize) -> Self {
        Self::with_interval(prefix, total, (total / 10).max(1), DEFAULT_EVERY)
    }

    pub fn with_interval(
        prefix:       impl Into<String>,
        total:        usize,
        every_images: usize,
        every:        Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            prefix: prefix.into(),
            total,
            done: 0,
            batches: 0,
            every_images,
            every,
            started: now,
            last_log: now,
            last_done: 0,
        }
    }

    /// Count one finished batch of `images`. Returns whether a line was logged.
    pub fn advance(&mut self, images: usize) -> bool {
        self.done    += images;
        self.batches += 1;

        let complete   = self.done >= self.total;
        let by_count   = self.every_images > 0 && self.done - self.last_done >= self.every_images;
        let by_time    = self.last_log.elapsed() >= self.every;
        if !(complete || by_count || by_time) {
            return false;
        }

        let secs = self.started.elapsed().as_secs_f64().max(0.001);
        tracing::info!(
            "{}: {}/{} images ({:.0}%) batches={} elapsed={:.1}s rate={:.1} img/s",
            self.prefix,
            self.done,
            self.total,
            self.fraction() * 100.0,
            self.batches,
            secs,
            self.done as f64 / secs,
        );
        self.last_log  = Instant::now();
        self.last_done = self.done;
        true
    }

    /// Share of the phase done so far, in [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.done as f64 / self.total as f64).min(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_logs_on_completion_only() {
        let mut progress = ProgressLog::with_interval("epoch-1-", 10, 0, HOUR);
        assert!(!progress.advance(4));
        assert!(!progress.advance(4));
        assert_eq!(progress.fraction(), 0.8);
        assert!(progress.advance(2));
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_logs_every_n_images() {
        let mut progress = ProgressLog::with_interval("Val-2-", 100, 25, HOUR);
        let logged: Vec<bool> = (0..10).map(|_| progress.advance(10)).collect();
        assert_eq!(
            logged,
            vec![false, false, true, false, false, true, false, false, true, true]
        );
    }

    #[test]
    fn test_logs_on_elapsed_time() {
        let mut progress = ProgressLog::with_interval("epoch-1-", 100, 0, Duration::ZERO);
        assert!(progress.advance(1));
    }

    #[test]
    fn test_default_interval_is_a_tenth() {
        let mut progress = ProgressLog::new("epoch-1-", 50);
        assert!(!progress.advance(4));
        assert!(progress.advance(1));
    }
}
