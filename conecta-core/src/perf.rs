use std::time::{Duration, Instant};

use tracing::debug;

/// Phase timer for one load, logged at debug level.
#[derive(Debug)]
pub struct PerfLog {
    start: Instant,
    last: Duration,
    checkpoints: usize,
}

impl PerfLog {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            last: Duration::ZERO,
            checkpoints: 0,
        }
    }

    /// Log the time spent since the previous checkpoint.
    pub fn checkpoint(&mut self, phase: &str) -> Duration {
        let elapsed = self.start.elapsed();
        let delta = elapsed.saturating_sub(self.last);
        self.checkpoints += 1;
        debug!(
            checkpoint = self.checkpoints,
            phase,
            delta_ms = delta.as_secs_f64() * 1000.0,
            "load checkpoint"
        );
        self.last = elapsed;
        delta
    }

    pub fn finish(&self) -> Duration {
        let total = self.start.elapsed();
        debug!(
            checkpoints = self.checkpoints,
            total_ms = total.as_secs_f64() * 1000.0,
            "load finished"
        );
        total
    }
}
