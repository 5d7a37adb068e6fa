//! Progress display for `upload-batch`.
//!
//! Draws an indicatif bar on stderr, advanced once per finished upload.

use indicatif::{ProgressBar, ProgressStyle};
use oss_image_bed_core::uploader::UploadResult;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}";

pub struct BatchProgress {
    bar: ProgressBar,
    failed: u64,
}

impl BatchProgress {
    /// Bar sized for `total` uploads.
    pub fn new(total: usize) -> Self {
        Self::with_bar(ProgressBar::new(total as u64))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar, failed: 0 }
    }

    /// Advance by one finished upload and show its file name.
    pub fn on_result(&mut self, result: &UploadResult) {
        if !result.success {
            self.failed += 1;
        }
        let name = result
            .local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
