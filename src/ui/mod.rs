//! Terminal UI for orchestration runs, rendered via `indicatif`.
//!
//! Two stacked bars: a work-package bar tracking how many WPs have
//! reached a terminal state, and a spinner with the current step. All
//! output goes through the `MultiProgress` so log lines and bars do not
//! interleave badly.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct RunUi {
    multi: MultiProgress,
    wp_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl RunUi {
    pub fn new(total_wps: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let wp_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let wp_bar = multi.add(ProgressBar::new(total_wps));
        wp_bar.set_style(wp_style);
        wp_bar.set_prefix("WPs");

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix("Step");
        step_bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            multi,
            wp_bar,
            step_bar,
            verbose,
        }
    }

    pub fn start_wp(&self, wp_id: &str, title: &str) {
        self.wp_bar.set_message(format!("{wp_id}: {title}"));
        self.step_bar.set_message(format!("{wp_id}: starting"));
    }

    pub fn step(&self, message: &str) {
        self.step_bar.set_message(message.to_string());
        if self.verbose {
            let _ = self.multi.println(format!("  {}", style(message).dim()));
        }
    }

    pub fn wp_done(&self, wp_id: &str) {
        self.wp_bar.inc(1);
        let _ = self
            .multi
            .println(format!("{} {}", style("✓").green().bold(), wp_id));
    }

    pub fn wp_failed(&self, wp_id: &str, error: &str) {
        self.wp_bar.inc(1);
        let _ = self.multi.println(format!(
            "{} {} {}",
            style("✗").red().bold(),
            wp_id,
            style(error).red()
        ));
    }

    pub fn wp_rework(&self, wp_id: &str, cycle: u32) {
        let _ = self.multi.println(format!(
            "{} {} sent back for rework (cycle {})",
            style("↺").yellow().bold(),
            wp_id,
            cycle
        ));
    }

    pub fn warn(&self, message: &str) {
        let _ = self
            .multi
            .println(format!("{} {}", style("⚠").yellow(), message));
    }

    pub fn finish(&self, done: usize, failed: usize) {
        self.step_bar.finish_and_clear();
        let summary = if failed == 0 {
            format!("{}", style(format!("{done} done")).green().bold())
        } else {
            format!(
                "{}, {}",
                style(format!("{done} done")).green().bold(),
                style(format!("{failed} failed")).red().bold()
            )
        };
        self.wp_bar.finish_with_message(summary);
    }
}
