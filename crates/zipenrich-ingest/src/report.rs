//! Run progress reporting
//!
//! The pipeline reports through a [`ProgressReporter`]; the default
//! [`NoopReporter`] does nothing and [`BarReporter`] drives a terminal
//! progress bar.

use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::{FileOutcome, RunState, RunSummary};

/// Observer of a pipeline run. Every method defaults to doing nothing.
pub trait ProgressReporter {
    fn state_changed(&mut self, _state: RunState) {}

    fn run_started(&mut self, _total: usize) {}

    fn file_finished(&mut self, _name: &str, _outcome: &FileOutcome) {}

    fn run_finished(&mut self, _summary: &RunSummary) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}

impl<R: ProgressReporter + ?Sized> ProgressReporter for Box<R> {
    fn state_changed(&mut self, state: RunState) {
        (**self).state_changed(state)
    }

    fn run_started(&mut self, total: usize) {
        (**self).run_started(total)
    }

    fn file_finished(&mut self, name: &str, outcome: &FileOutcome) {
        (**self).file_finished(name, outcome)
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        (**self).run_finished(summary)
    }
}

/// Terminal progress bar, one tick per archive
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Report into an existing bar (e.g. `ProgressBar::hidden()`)
    pub fn with_bar(bar: ProgressBar) -> Self {
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarReporter {
    fn state_changed(&mut self, state: RunState) {
        self.bar.set_message(state.to_string());
    }

    fn run_started(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
    }

    fn file_finished(&mut self, name: &str, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Uploaded { .. } => self.bar.set_message(format!("Uploaded {}", name)),
            FileOutcome::Skipped(failure) => {
                self.bar.set_message(format!("Skipped {} ({})", name, failure.stage))
            },
        }
        self.bar.inc(1);
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        self.bar.finish_with_message(format!(
            "{} uploaded, {} skipped",
            summary.uploaded,
            summary.skipped()
        ));
    }
}
