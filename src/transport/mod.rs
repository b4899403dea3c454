use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};

use crate::error::{TranscriptionError, UploadError};
use crate::media::TranscodedAudio;

/// Remote service the pipeline uploads audio to and requests transcriptions from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload the audio file and return the server-issued video id
    async fn upload_audio(&self, audio: TranscodedAudio) -> Result<String, UploadError>;

    /// Ask the server to transcribe an uploaded video
    async fn request_transcription(
        &self,
        video_id: String,
        prompt: Option<String>,
    ) -> Result<(), TranscriptionError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    video: Option<UploadedVideo>,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: Option<String>,
}

/// JSON body of a transcription request; an absent prompt is omitted
#[derive(Debug, Serialize)]
pub struct TranscriptionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'a str>,
}

/// Extract `video.id` from an upload response body
pub fn parse_upload_response(body: &[u8]) -> Result<String, UploadError> {
    let response: UploadResponse = serde_json::from_slice(body)?;

    response
        .video
        .and_then(|video| video.id)
        .filter(|id| !id.is_empty())
        .ok_or(UploadError::MissingIdentifier)
}

/// [`Transport`] over HTTP
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn upload_url(&self) -> String {
        format!("{}/videos", self.base_url)
    }

    fn transcription_url(&self, video_id: &str) -> String {
        format!(
            "{}/videos/{}/transcription",
            self.base_url,
            urlencoding::encode(video_id)
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload_audio(&self, audio: TranscodedAudio) -> Result<String, UploadError> {
        let url = self.upload_url();
        let file_name = audio.file_name();
        let mime_type = audio.mime_type();

        tracing::info!("Uploading {} ({} bytes) to {}", file_name, audio.len(), url);

        let part = multipart::Part::bytes(audio.into_bytes())
            .file_name(file_name)
            .mime_str(mime_type)?;
        let form = multipart::Form::new().part("file", part);

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let video_id = parse_upload_response(&body)?;

        tracing::debug!(video_id = %video_id, "Upload accepted");

        Ok(video_id)
    }

    async fn request_transcription(
        &self,
        video_id: String,
        prompt: Option<String>,
    ) -> Result<(), TranscriptionError> {
        let url = self.transcription_url(&video_id);

        tracing::info!("Requesting transcription for video {}", video_id);

        let response = self
            .client
            .post(&url)
            .json(&TranscriptionRequest {
                prompt: prompt.as_deref(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriptionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
