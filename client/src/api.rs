use log::{debug, error, info};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use shared::{ApiConfig, AudioArtifact, ConsultError, ConsultationResult, ImageArtifact};
use std::time::Duration;
use uuid::Uuid;

/// HTTP client for the consultation service.
///
/// The base URL and timeout come in through [`ApiConfig`] at construction;
/// nothing here reads process-global state. Failed requests are never
/// retried internally.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ConsultError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ConsultError::NetworkError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Primary flow: submit whichever artifacts are present and get back
    /// the transcription, the analysis, and an optional speech reply.
    pub async fn medical_consultation(
        &self,
        audio: Option<&AudioArtifact>,
        image: Option<&ImageArtifact>,
    ) -> Result<ConsultationResult, ConsultError> {
        let request_id = Uuid::new_v4();
        info!(
            "consultation {}: audio={} image={}",
            request_id,
            audio.is_some(),
            image.is_some()
        );

        let mut form = Form::new();
        if let Some(image) = image {
            form = form.part("image", image_part(image)?);
        }
        if let Some(audio) = audio {
            form = form.part("audio", audio_part(audio)?);
        }

        let response = self
            .http
            .post(self.endpoint("medical-consultation"))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let mut result: ConsultationResult = response.json().await.map_err(request_error)?;
        // The service reports "no transcription" as an empty string.
        if result.transcription.as_deref() == Some("") {
            result.transcription = None;
        }
        info!("consultation {} complete", request_id);
        Ok(result)
    }

    pub async fn transcribe_audio(&self, audio: &AudioArtifact) -> Result<String, ConsultError> {
        let form = Form::new().part("audio", audio_part(audio)?);
        let response = self
            .http
            .post(self.endpoint("transcribe-audio"))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let body: TranscriptionResponse = response.json().await.map_err(request_error)?;
        Ok(body.transcription)
    }

    pub async fn analyze_image(
        &self,
        image: &ImageArtifact,
        transcription: Option<&str>,
    ) -> Result<String, ConsultError> {
        let mut form = Form::new().part("image", image_part(image)?);
        if let Some(text) = transcription {
            form = form.text("transcription", text.to_string());
        }

        let response = self
            .http
            .post(self.endpoint("analyze-image"))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let body: AnalysisResponse = response.json().await.map_err(request_error)?;
        Ok(body.analysis)
    }

    /// Text in, synthesized speech out.
    pub async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ConsultError> {
        let response = self
            .http
            .post(self.endpoint("text-to-speech"))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }

    pub async fn health_check(&self) -> Result<String, ConsultError> {
        let response = self
            .http
            .get(self.endpoint(""))
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let body: HealthResponse = response.json().await.map_err(request_error)?;
        Ok(body.message)
    }

    /// Resolve a server-relative `audio_url` and download the reply audio.
    pub async fn fetch_audio(&self, audio_url: &str) -> Result<Vec<u8>, ConsultError> {
        let url = self.endpoint(audio_url);
        debug!("fetching reply audio from {}", url);

        let response = self.http.get(url).send().await.map_err(request_error)?;
        let response = check_status(response).await?;

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    transcription: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    analysis: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    message: String,
}

fn audio_part(audio: &AudioArtifact) -> Result<Part, ConsultError> {
    Part::bytes(audio.data.clone())
        .file_name(AudioArtifact::FILE_NAME)
        .mime_str(AudioArtifact::MEDIA_TYPE)
        .map_err(|e| ConsultError::NetworkError(e.to_string()))
}

fn image_part(image: &ImageArtifact) -> Result<Part, ConsultError> {
    Part::bytes(image.data.clone())
        .file_name(image.file_name.clone())
        .mime_str(&image.media_type)
        .map_err(|e| ConsultError::NetworkError(e.to_string()))
}

fn request_error(err: reqwest::Error) -> ConsultError {
    if err.is_timeout() {
        ConsultError::NetworkError("request timed out".to_string())
    } else if err.is_connect() {
        ConsultError::NetworkError(format!("connection failed: {}", err))
    } else {
        ConsultError::NetworkError(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ConsultError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("server returned {}: {}", status, body);
    Err(ConsultError::ServerError {
        status: status.as_u16(),
        body,
    })
}
