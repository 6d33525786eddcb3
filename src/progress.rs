//! Terminal progress for runs.

use crate::ui;
use dispatch::{DeviceOutcome, RunObserver, RunReport};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress bar that advances as devices finish.
///
/// Each finished device is printed above the bar as it completes.
pub struct RunProgress {
    bar: ProgressBar,
    print_outcomes: bool,
}

impl RunProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self {
            bar,
            print_outcomes: true,
        }
    }

    /// No bar and no per-device lines (JSON output, quiet mode)
    pub fn hidden() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        Self {
            bar,
            print_outcomes: false,
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for RunProgress {
    fn on_run_start(&self, run_id: &str, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_message(run_id.to_string());
    }

    fn on_device_start(&self, _device_id: &str) {}

    fn on_device_complete(&self, outcome: &DeviceOutcome) {
        if self.print_outcomes {
            self.bar.println(format!("  {}", ui::outcome_line(outcome)));
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}
