use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::{PipelineListener, PipelineStage};

/// Terminal progress display for a pipeline run
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(100)
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(PipelineStage::Waiting.label());
        Self { bar }
    }

    /// Leave the bar in place with a failure message
    pub fn abandon(&self, message: String) {
        self.bar.abandon_with_message(message);
    }
}

impl PipelineListener for ConsoleReporter {
    fn on_stage(&self, stage: PipelineStage) {
        match stage {
            PipelineStage::Converting => {
                self.bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
                );
                self.bar.set_position(0);
            }
            PipelineStage::Uploading => {
                self.bar.set_style(
                    ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                self.bar.enable_steady_tick(std::time::Duration::from_millis(120));
            }
            _ => {}
        }
        self.bar.set_message(stage.label());
    }

    fn on_progress(&self, fraction: f64) {
        self.bar.set_position((fraction * 100.0).round() as u64);
    }

    fn on_completed(&self, video_id: &str) {
        self.bar
            .finish_with_message(format!("Transcription requested for video {}", video_id));
    }
}
