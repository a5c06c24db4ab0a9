use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// 並列ビルド用のスピナー群
#[derive(Clone)]
pub struct BuildProgress {
    multi: MultiProgress,
    enabled: bool,
}

impl BuildProgress {
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self { multi, enabled }
    }

    pub fn hidden() -> Self {
        Self::new(false)
    }

    pub fn start(&self, image: &str) -> ImageProgress {
        let pb = if self.enabled {
            self.multi.add(ProgressBar::new_spinner())
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_prefix(image.to_string());
        pb.set_message("Building...");
        pb.enable_steady_tick(Duration::from_millis(120));

        ImageProgress { progress_bar: pb }
    }
}

pub struct ImageProgress {
    progress_bar: ProgressBar,
}

impl ImageProgress {
    pub fn set_message(&self, msg: &str) {
        self.progress_bar.set_message(msg.to_string());
    }

    pub fn finish_success(&self) {
        self.progress_bar.finish_with_message("Build completed ✓");
    }

    pub fn finish_error(&self, error: &str) {
        self.progress_bar
            .finish_with_message(format!("Build failed: {}", error));
    }
}
