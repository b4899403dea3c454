//! Clipscribe - extract the audio of a video, upload it and request a transcription
//!
//! The audio track is converted locally to a small MP3 by a lazily loaded
//! media engine, then a linear pipeline uploads it and asks the remote
//! service to transcribe it.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod transcode;
pub mod transport;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use engine::{acquire_engine, EngineHandle, EngineLoader, EngineResources, MediaEngine};
pub use error::{
    ConversionError, EngineError, EngineLoadError, PipelineError, TranscriptionError, UploadError,
};
pub use media::{SelectedMedia, TranscodedAudio};
pub use pipeline::{ConversionPipeline, PipelineListener, PipelineStage};
pub use transport::{HttpTransport, Transport};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;
