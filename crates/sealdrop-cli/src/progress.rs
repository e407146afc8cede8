//! Terminal progress display.

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Progress bar for one file transfer.
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    /// Bar over `total_bytes`, labelled with the file name.
    pub fn new(total_bytes: u64, file_name: &str) -> Self {
        let bar = ProgressBar::new(total_bytes);
        let style = ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_message(file_name.to_string());
        Self { bar }
    }

    /// Hidden bar, for non-interactive use.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Set the acknowledged byte count.
    pub fn update(&self, bytes: u64) {
        self.bar.set_position(bytes);
    }

    /// Finish and leave `msg` in place of the bar.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.bar.finish_with_message(msg.into());
    }

    /// Remove the bar after a failure.
    pub fn abandon(&self) {
        self.bar.abandon();
    }

    /// Clone of the underlying handle, for use from a callback.
    pub fn handle(&self) -> ProgressBar {
        self.bar.clone()
    }
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
