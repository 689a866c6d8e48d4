use serde::{Deserialize, Serialize};

/// A finished recording, sealed into its WAV container.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioArtifact {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
}

impl AudioArtifact {
    pub const FILE_NAME: &'static str = "recording.wav";
    pub const MEDIA_TYPE: &'static str = "audio/wav";
}

/// A selected image file plus its renderable preview.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArtifact {
    pub file_name: String,
    pub media_type: String,
    pub data: Vec<u8>,
    /// `data:<type>;base64,<payload>` representation of the file.
    pub preview: String,
}

/// Artifacts accumulated for the next submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsultationInput {
    pub audio: Option<AudioArtifact>,
    pub image: Option<ImageArtifact>,
}

impl ConsultationInput {
    pub fn has_artifacts(&self) -> bool {
        self.audio.is_some() || self.image.is_some()
    }

    pub fn clear(&mut self) {
        self.audio = None;
        self.image = None;
    }
}

/// Successful response from the consultation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationResult {
    #[serde(default)]
    pub transcription: Option<String>,
    pub analysis: String,
    /// Server-relative path to the synthesized speech reply.
    #[serde(default)]
    pub audio_url: Option<String>,
}

/// What the consultation workflow is currently doing. Exactly one state is
/// active at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    Idle,
    Capturing,
    Ready,
    Submitting,
    Succeeded(ConsultationResult),
    Failed(String),
}
