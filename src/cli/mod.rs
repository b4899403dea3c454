use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "clipscribe",
    about = "Clipscribe - Extract the audio of a video, upload it and request a transcription",
    version,
    long_about = "Converts the audio track of a local video into a small MP3 with ffmpeg, uploads it to the transcription service and asks the service to transcribe it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert, upload and request a transcription for a video
    Run {
        /// Video file to process
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Prompt sent along with the transcription request (keywords, names, context)
        #[arg(short, long, value_name = "TEXT")]
        prompt: Option<String>,

        /// Override the service base URL
        #[arg(long, value_name = "URL", env = "CLIPSCRIBE_API_URL")]
        api_url: Option<String>,
    },

    /// Only convert a video's audio to MP3
    Transcode {
        /// Video file to convert
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output MP3 path
        #[arg(short, long, value_name = "FILE", default_value = "audio.mp3")]
        output: PathBuf,
    },

    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write the current configuration to the config file
        #[arg(long)]
        init: bool,
    },

    /// Check that the media engine can be loaded
    Check,
}
