//! Per-file transfer progress bars.

use indicatif::{ProgressBar, ProgressStyle};

use crate::remote::TransferProgress;

const BAR_TEMPLATE: &str = "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})";

/// Byte-based progress bar for one upload.
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    /// Create a bar labelled with the file being sent. Hidden bars draw nothing.
    pub fn new(label: &str, visible: bool) -> Self {
        let bar = if visible {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(label.to_string());
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

impl TransferProgress for TransferBar {
    fn on_progress(&mut self, bytes_sent: u64, total_bytes: u64) {
        if self.bar.length() != Some(total_bytes) {
            self.bar.set_length(total_bytes);
        }
        self.bar.set_position(bytes_sent);
    }
}
