//! Progress throttling for the copy phase.

use std::time::{Duration, Instant};

/// Default minimum time between two time-triggered progress reports
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(60);

/// Decides which `(done, total)` updates are worth reporting.
///
/// An update is reported when it crosses a new 10 % boundary, or when the
/// interval has elapsed since the last report. Completion is reported
/// exactly once.
#[derive(Debug)]
pub struct ProgressThrottle {
    total: usize,
    interval: Duration,
    last_decile: usize,
    last_report: Instant,
    finished: bool,
}

impl ProgressThrottle {
    pub fn new(total: usize, interval: Duration, start: Instant) -> Self {
        Self {
            total,
            interval,
            last_decile: 0,
            last_report: start,
            finished: false,
        }
    }

    pub fn should_report(&mut self, done: usize, now: Instant) -> bool {
        if self.finished || self.total == 0 {
            return false;
        }

        if done >= self.total {
            self.finished = true;
            self.last_report = now;
            return true;
        }

        let decile = done * 10 / self.total;
        let elapsed = now.saturating_duration_since(self.last_report);
        if decile > self.last_decile || elapsed >= self.interval {
            self.last_decile = self.last_decile.max(decile);
            self.last_report = now;
            return true;
        }
        false
    }
}

/// `" 50.00 % (2/4) uploaded"`
pub fn format_progress(done: usize, total: usize) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    };
    format!("{percent:6.2} % ({done}/{total}) uploaded")
}
