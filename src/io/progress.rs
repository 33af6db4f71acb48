//! Progress reporting for long-running stages
//!
//! Library code reports through [`ProgressSink`]; the command line installs an
//! `indicatif` backed [`ProgressReporter`], tests and frame workers use
//! [`NoProgress`].

use crate::io::configuration::PROGRESS_BAR_WIDTH;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{LazyLock, Mutex};

/// Receiver of stage progress
///
/// One stage is active at a time; starting a new stage replaces the previous one.
pub trait ProgressSink: Send + Sync {
    /// Begin a stage with `total` steps (zero when the total is unknown)
    fn start(&self, label: &str, total: u64);

    /// Record `delta` completed steps
    fn advance(&self, delta: u64);

    /// Close the active stage
    fn finish(&self);
}

/// Sink that discards every update
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _label: &str, _total: u64) {}

    fn advance(&self, _delta: u64) {}

    fn finish(&self) {}
}

static STAGE_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    let template = format!(
        "{{msg}} [{{bar:{PROGRESS_BAR_WIDTH}.cyan/blue}}] {{pos}}/{{len}} [{{elapsed_precise}}<{{eta_precise}}]"
    );
    ProgressStyle::default_bar()
        .template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
});

static OPEN_ENDED_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_spinner()
        .template("{spinner} {msg} {pos} [{elapsed_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
});

/// Terminal progress bars for the command line
pub struct ProgressReporter {
    multi_progress: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    /// Reporter drawing to stderr
    pub fn new() -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            active: Mutex::new(None),
        }
    }

    /// Reporter that tracks state without drawing anything
    pub fn hidden() -> Self {
        Self {
            multi_progress: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            active: Mutex::new(None),
        }
    }

    /// Position of the active stage, if any
    pub fn position(&self) -> Option<u64> {
        self.active
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(ProgressBar::position))
    }
}

impl ProgressSink for ProgressReporter {
    fn start(&self, label: &str, total: u64) {
        let bar = if total == 0 {
            let bar = ProgressBar::no_length();
            bar.set_style(OPEN_ENDED_STYLE.clone());
            bar
        } else {
            let bar = ProgressBar::new(total);
            bar.set_style(STAGE_STYLE.clone());
            bar
        };
        bar.set_message(format!("[{label}]"));
        let bar = self.multi_progress.add(bar);

        if let Ok(mut active) = self.active.lock()
            && let Some(previous) = active.replace(bar)
        {
            previous.finish_and_clear();
        }
    }

    fn advance(&self, delta: u64) {
        if let Ok(active) = self.active.lock()
            && let Some(bar) = active.as_ref()
        {
            bar.inc(delta);
        }
    }

    fn finish(&self) {
        if let Ok(mut active) = self.active.lock()
            && let Some(bar) = active.take()
        {
            bar.finish_and_clear();
            self.multi_progress.remove(&bar);
        }
    }
}
