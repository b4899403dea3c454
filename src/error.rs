use std::sync::Arc;

use crate::pipeline::PipelineStage;

/// Failure to bring the media engine up.
///
/// Cloneable so a single failed load can be handed to every caller that
/// was waiting on it.
#[derive(thiserror::Error, Debug, Clone)]
pub enum EngineLoadError {
    #[error("Media engine unavailable ({locator}): {reason}")]
    Unavailable { locator: String, reason: Arc<str> },

    #[error("Failed to prepare engine workspace: {0}")]
    Workspace(Arc<str>),
}

impl EngineLoadError {
    pub fn unavailable(locator: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            locator: locator.into(),
            reason: reason.to_string().into(),
        }
    }

    pub fn workspace(reason: impl std::fmt::Display) -> Self {
        Self::Workspace(reason.to_string().into())
    }
}

/// Errors raised by a loaded engine while handling files or commands
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Media engine is not loaded")]
    NotLoaded,

    #[error("Invalid engine file name: {0:?}")]
    InvalidName(String),

    #[error("Engine file not found: {0}")]
    MissingFile(String),

    #[error("Engine command failed: {0}")]
    ExecutionFailed(String),

    #[error("Engine IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ConversionError {
    #[error(transparent)]
    EngineLoad(#[from] EngineLoadError),

    #[error("Audio extraction failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Audio extraction produced no output")]
    EmptyOutput,
}

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("Upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upload rejected: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upload response did not contain a video id")]
    MissingIdentifier,

    #[error("Upload response could not be parsed: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum TranscriptionError {
    #[error("Transcription request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Transcription rejected: HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Everything a pipeline run can fail with
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error("Invalid pipeline transition: {from} -> {to}")]
    InvalidTransition { from: PipelineStage, to: PipelineStage },

    #[error("Input is locked while the pipeline is {0}")]
    InputLocked(PipelineStage),
}
