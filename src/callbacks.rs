//! Caller-supplied hooks for a transfer run.

use crate::pattern::DatedPattern;
use std::fmt;

pub type LogFn = Box<dyn Fn(&str) + Send + Sync>;
pub type AbortFn = Box<dyn Fn() -> bool + Send + Sync>;
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Hooks used by the transfer engine.
///
/// Defaults: pattern `^.*%Y%m%d.*$`, log sinks forwarding to `tracing`,
/// an abort-check that never fires and a progress reporter that does nothing.
pub struct UploadCallbacks {
    /// Which files or directories are dated units
    pub dated_pattern: DatedPattern,
    pub log_info: LogFn,
    pub log_error: LogFn,
    /// Polled between file transfers and between units
    pub should_abort: AbortFn,
    /// Called with `(done, total)` at the throttled progress points
    pub report_progress: ProgressFn,
}

impl UploadCallbacks {
    pub fn with_pattern(mut self, pattern: DatedPattern) -> Self {
        self.dated_pattern = pattern;
        self
    }

    pub fn with_log_info(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log_info = Box::new(f);
        self
    }

    pub fn with_log_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log_error = Box::new(f);
        self
    }

    pub fn with_abort_check(mut self, f: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.should_abort = Box::new(f);
        self
    }

    pub fn with_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.report_progress = Box::new(f);
        self
    }

    pub(crate) fn info(&self, message: &str) {
        (self.log_info)(message);
    }

    pub(crate) fn error(&self, message: &str) {
        (self.log_error)(message);
    }

    pub(crate) fn abort_requested(&self) -> bool {
        (self.should_abort)()
    }

    pub(crate) fn progress(&self, done: usize, total: usize) {
        (self.report_progress)(done, total);
    }
}

impl Default for UploadCallbacks {
    fn default() -> Self {
        Self {
            dated_pattern: DatedPattern::default(),
            log_info: Box::new(|msg| tracing::info!("{}", msg)),
            log_error: Box::new(|msg| tracing::error!("{}", msg)),
            should_abort: Box::new(|| false),
            report_progress: Box::new(|_, _| {}),
        }
    }
}

impl fmt::Debug for UploadCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCallbacks")
            .field("dated_pattern", &self.dated_pattern)
            .finish_non_exhaustive()
    }
}
