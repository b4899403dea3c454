//! Audio extraction on top of a loaded media engine.

use crate::engine::{EngineHandle, ProgressCallback, ProgressTracker};
use crate::error::ConversionError;
use crate::media::{SelectedMedia, TranscodedAudio};
use crate::utils::format_file_size;

/// Engine slot the selected file is written to
pub const INPUT_NAME: &str = "input.mp4";

/// Engine slot the encoded audio is read from
pub const OUTPUT_NAME: &str = "output.mp3";

/// Target MP3 bitrate, kept low since the audio is only used for speech
pub const AUDIO_BITRATE: &str = "20k";

/// Command that extracts the first audio stream of [`INPUT_NAME`] into an
/// MP3 at [`OUTPUT_NAME`]
pub fn extraction_args() -> Vec<String> {
    [
        "-i",
        INPUT_NAME,
        "-map",
        "0:a:0",
        "-b:a",
        AUDIO_BITRATE,
        "-acodec",
        "libmp3lame",
        OUTPUT_NAME,
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

/// Extract the audio track of `media` as MP3.
///
/// `on_progress` sees a non-decreasing fraction in `[0, 1]`. Uses the
/// engine's fixed input/output slots, so runs sharing an engine must not
/// overlap.
pub async fn transcode(
    engine: &EngineHandle,
    media: &SelectedMedia,
    on_progress: ProgressCallback,
) -> Result<TranscodedAudio, ConversionError> {
    tracing::info!(
        "Converting {} ({}) to MP3",
        media.file_name(),
        format_file_size(media.len() as u64)
    );

    engine.on_progress(ProgressTracker::new(on_progress).into_callback());

    engine.write_file(INPUT_NAME, media.bytes()).await?;
    engine.exec(&extraction_args()).await?;
    let bytes = engine.read_file(OUTPUT_NAME).await?;

    if bytes.is_empty() {
        return Err(ConversionError::EmptyOutput);
    }

    tracing::info!("Conversion finished: {}", format_file_size(bytes.len() as u64));

    Ok(TranscodedAudio::new(bytes))
}
