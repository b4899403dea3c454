use anyhow::Result;
use std::path::Path;

/// MIME type of every transcoded audio file
pub const AUDIO_MIME: &str = "audio/mpeg";

/// Logical file name the transcoded audio is uploaded under
pub const AUDIO_FILE_NAME: &str = "audio.mp3";

/// The file a user picked as pipeline input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMedia {
    bytes: Vec<u8>,
    mime_type: String,
    file_name: String,
}

impl SelectedMedia {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Read a local file, declaring its MIME type from the extension
    pub async fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("File does not exist: {}", path.display());
        }

        if !path.is_file() {
            anyhow::bail!("Path is not a file: {}", path.display());
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Cannot read file {}: {}", path.display(), e))?;

        if bytes.is_empty() {
            anyhow::bail!("File is empty: {}", path.display());
        }

        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(mime_from_extension)
            .unwrap_or("application/octet-stream");

        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("input")
            .to_string();

        tracing::debug!("Selected {} ({}, {} bytes)", file_name, mime_type, bytes.len());

        Ok(Self::new(bytes, mime_type, file_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the declared type is a video container
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

/// Audio extracted from a [`SelectedMedia`], always MP3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodedAudio {
    bytes: Vec<u8>,
}

impl TranscodedAudio {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        AUDIO_MIME
    }

    pub fn file_name(&self) -> &'static str {
        AUDIO_FILE_NAME
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// MIME type for a media file extension
pub fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension("mp4"), "video/mp4");
        assert_eq!(mime_from_extension("MOV"), "video/quicktime");
        assert_eq!(mime_from_extension("aac"), "audio/mp4");
        assert_eq!(mime_from_extension("xyz"), "application/octet-stream");
    }

    #[test]
    fn test_transcoded_audio_is_tagged_mp3() {
        let audio = TranscodedAudio::new(vec![1, 2, 3]);
        assert_eq!(audio.mime_type(), "audio/mpeg");
        assert_eq!(audio.file_name(), "audio.mp3");
        assert_eq!(audio.len(), 3);
    }

    #[tokio::test]
    async fn test_from_path_reads_video() {
        let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        file.write_all(b"fake video").unwrap();

        let media = SelectedMedia::from_path(file.path()).await.unwrap();

        assert_eq!(media.bytes(), b"fake video");
        assert_eq!(media.mime_type(), "video/mp4");
        assert!(media.is_video());
        assert!(media.file_name().ends_with(".mp4"));
    }

    #[tokio::test]
    async fn test_from_path_rejects_missing_and_empty() {
        let err = SelectedMedia::from_path(Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("File does not exist"));

        let empty = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        let err = SelectedMedia::from_path(empty.path()).await.unwrap_err();
        assert!(err.to_string().contains("File is empty"));

        let dir = tempfile::tempdir().unwrap();
        let err = SelectedMedia::from_path(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Path is not a file"));
    }
}
