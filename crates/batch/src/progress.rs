//! Console progress display for a batch run

use crate::encode::EncodeProgressSample;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} (eta {eta}) {prefix} {wide_msg}";

/// Batch-level bar whose message tracks the encoder's latest status
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Visible bar on stderr sized to `total` items
    pub fn new(total: usize) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .map(|style| style.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        Self { bar }
    }

    /// Bar that draws nothing, for quiet runs and tests
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::hidden());
        Self { bar }
    }

    /// Name the item now being encoded
    pub fn set_current(&self, name: &str) {
        self.bar.set_prefix(name.to_string());
        self.bar.set_message("starting");
    }

    pub fn on_sample(&self, sample: &EncodeProgressSample) {
        self.bar
            .set_message(format!("time={} bitrate={}", sample.elapsed, sample.bitrate));
    }

    /// Count one item as handled
    pub fn advance(&self) {
        self.bar.inc(1);
    }

    /// Print a line above the bar without tearing it
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", msg.as_ref());
        } else {
            self.bar.println(msg);
        }
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }

    #[cfg(test)]
    fn message(&self) -> String {
        self.bar.message()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
