//! The upload pipeline: select a video, convert its audio, upload it and
//! request a transcription.
//!
//! ```text
//! Waiting -> Converting -> Uploading -> Generating -> Success
//! ```
//!
//! Progress only moves forward. Any failure stops the run in the stage it
//! happened in; a new attempt needs a new [`ConversionPipeline`].

use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::engine::{EngineLoader, ProgressCallback};
use crate::error::{ConversionError, PipelineError};
use crate::media::{SelectedMedia, TranscodedAudio};
use crate::transcode::transcode;
use crate::transport::Transport;

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Waiting,
    Converting,
    Uploading,
    Generating,
    Success,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::Waiting,
        PipelineStage::Converting,
        PipelineStage::Uploading,
        PipelineStage::Generating,
        PipelineStage::Success,
    ];

    /// The only stage this one may advance to
    pub fn next(self) -> Option<Self> {
        match self {
            PipelineStage::Waiting => Some(PipelineStage::Converting),
            PipelineStage::Converting => Some(PipelineStage::Uploading),
            PipelineStage::Uploading => Some(PipelineStage::Generating),
            PipelineStage::Generating => Some(PipelineStage::Success),
            PipelineStage::Success => None,
        }
    }

    /// Selection and prompt can only change before a run starts
    pub fn accepts_input(self) -> bool {
        self == PipelineStage::Waiting
    }

    pub fn is_terminal(self) -> bool {
        self == PipelineStage::Success
    }

    /// Human readable status line
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Waiting => "Waiting for a video",
            PipelineStage::Converting => "Converting audio...",
            PipelineStage::Uploading => "Uploading...",
            PipelineStage::Generating => "Requesting transcription...",
            PipelineStage::Success => "Done",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Waiting => write!(f, "waiting"),
            PipelineStage::Converting => write!(f, "converting"),
            PipelineStage::Uploading => write!(f, "uploading"),
            PipelineStage::Generating => write!(f, "generating"),
            PipelineStage::Success => write!(f, "success"),
        }
    }
}

/// Receives pipeline events
pub trait PipelineListener: Send + Sync {
    /// A new stage was entered
    fn on_stage(&self, _stage: PipelineStage) {}

    /// Conversion progress in `[0, 1]`; informational only
    fn on_progress(&self, _fraction: f64) {}

    /// The run finished; called once with the uploaded video id
    fn on_completed(&self, video_id: &str);
}

/// Drives one run of select → convert → upload → transcribe
pub struct ConversionPipeline<T: Transport> {
    run_id: Uuid,
    loader: Arc<EngineLoader>,
    transport: T,
    listener: Arc<dyn PipelineListener>,
    stage: watch::Sender<PipelineStage>,
    selection: Option<SelectedMedia>,
}

impl<T: Transport> ConversionPipeline<T> {
    pub fn new(
        loader: Arc<EngineLoader>,
        transport: T,
        listener: Arc<dyn PipelineListener>,
    ) -> Self {
        let (stage, _) = watch::channel(PipelineStage::Waiting);
        Self {
            run_id: Uuid::new_v4(),
            loader,
            transport,
            listener,
            stage,
            selection: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stage(&self) -> PipelineStage {
        *self.stage.borrow()
    }

    /// Watch the current stage
    pub fn subscribe(&self) -> watch::Receiver<PipelineStage> {
        self.stage.subscribe()
    }

    pub fn selection(&self) -> Option<&SelectedMedia> {
        self.selection.as_ref()
    }

    /// Pick the video to convert, replacing any earlier pick
    pub fn select_file(&mut self, media: SelectedMedia) -> Result<(), PipelineError> {
        let stage = self.stage();
        if !stage.accepts_input() {
            return Err(PipelineError::InputLocked(stage));
        }

        if let Some(previous) = self.selection.replace(media) {
            tracing::debug!("Replaced selection {}", previous.file_name());
        }
        Ok(())
    }

    /// Run the whole pipeline with the prompt as it is now.
    ///
    /// Returns `Ok(None)` without doing anything when no file is selected.
    /// On success the listener is notified and the video id returned.
    pub async fn submit(&mut self, prompt: Option<String>) -> Result<Option<String>, PipelineError> {
        let stage = self.stage();
        if stage != PipelineStage::Waiting {
            return Err(PipelineError::InvalidTransition {
                from: stage,
                to: PipelineStage::Converting,
            });
        }

        let Some(media) = self.selection.take() else {
            tracing::debug!("Submit ignored, no file selected");
            return Ok(None);
        };

        let span = tracing::info_span!("pipeline", run_id = %self.run_id);
        self.run(media, prompt).instrument(span).await.map(Some)
    }

    async fn run(&mut self, media: SelectedMedia, prompt: Option<String>) -> Result<String, PipelineError> {
        self.advance(PipelineStage::Converting)?;
        let audio = self.convert(&media).await?;
        drop(media);

        self.advance(PipelineStage::Uploading)?;
        let video_id = self.transport.upload_audio(audio).await?;
        tracing::info!(video_id = %video_id, "Audio uploaded");

        self.advance(PipelineStage::Generating)?;
        self.transport
            .request_transcription(video_id.clone(), prompt)
            .await?;

        self.advance(PipelineStage::Success)?;
        self.listener.on_completed(&video_id);

        Ok(video_id)
    }

    async fn convert(&self, media: &SelectedMedia) -> Result<TranscodedAudio, ConversionError> {
        let engine = self.loader.acquire().await?;

        let listener = Arc::clone(&self.listener);
        let on_progress: ProgressCallback = Arc::new(move |fraction| {
            tracing::debug!(progress = fraction, "Conversion progress");
            listener.on_progress(fraction);
        });

        transcode(&engine, media, on_progress).await
    }

    fn advance(&mut self, next: PipelineStage) -> Result<(), PipelineError> {
        let current = self.stage();
        if current.next() != Some(next) {
            return Err(PipelineError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        self.stage.send_replace(next);
        tracing::info!(stage = %next, "Pipeline stage changed");
        self.listener.on_stage(next);
        Ok(())
    }
}
