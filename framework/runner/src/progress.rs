use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use truapi_client::prelude::ResourceId;

/// Displays a spinner with the latest status while a run is being followed.
pub struct StatusSpinner {
    pb: ProgressBar,
}

impl StatusSpinner {
    pub fn start(run_id: &ResourceId) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
            .unwrap_or_else(|e| {
                log::warn!("Failed to set progress style: {e}");
                ProgressStyle::default_spinner()
            });
        pb.set_style(style);
        pb.set_prefix(format!("run {run_id}"));
        pb.enable_steady_tick(Duration::from_millis(250));

        Self { pb }
    }

    pub fn update(&self, ui_status: &str) {
        self.pb.set_message(ui_status.to_string());
    }

    pub fn finish(self) {
        self.pb.finish_and_clear();
    }
}
