use rodio::{Decoder, OutputStream, Sink};
use shared::{ConsultationInput, ConsultationResult, WorkflowState};
use std::io::Cursor;

/// Standing product requirement: every rendered analysis carries this.
pub const DISCLAIMER: &str = "This analysis is for educational and informational purposes only. \
It is not a diagnosis; always consult a licensed healthcare provider for medical concerns.";

pub fn format_status(state: &WorkflowState, input: &ConsultationInput) -> String {
    let mut lines = Vec::new();

    match state {
        WorkflowState::Idle => {
            lines.push("Nothing staged. 'record' to capture audio, 'image <path>' to attach a scan.".to_string());
        }
        WorkflowState::Capturing => {
            lines.push("Recording... 'stop' to finish.".to_string());
        }
        WorkflowState::Ready => {
            if let Some(audio) = &input.audio {
                lines.push(format!(
                    "Audio staged: {:.1}s recording ({} Hz).",
                    audio.duration_ms as f64 / 1000.0,
                    audio.sample_rate
                ));
            }
            if let Some(image) = &input.image {
                lines.push(format!(
                    "Image staged: {} ({}, {} bytes).",
                    image.file_name,
                    image.media_type,
                    image.data.len()
                ));
            }
            if !input.has_artifacts() {
                lines.push("Nothing staged yet.".to_string());
            }
            lines.push("'submit' to request an analysis.".to_string());
        }
        WorkflowState::Submitting => {
            lines.push("Submitting consultation...".to_string());
        }
        WorkflowState::Succeeded(_) => {
            lines.push("Consultation complete. 'reset' to start a new one.".to_string());
        }
        WorkflowState::Failed(message) => {
            lines.push(format!("Consultation failed: {}", message));
            lines.push("'reset' to start over.".to_string());
        }
    }

    lines.join("\n")
}

pub fn format_result(result: &ConsultationResult) -> String {
    let mut lines = Vec::new();

    if let Some(transcription) = &result.transcription {
        lines.push("Your symptoms (transcribed):".to_string());
        lines.push(format!("  {}", transcription));
        lines.push(String::new());
    }

    lines.push("AI doctor analysis:".to_string());
    lines.push(format!("  {}", result.analysis));

    if result.audio_url.is_some() {
        lines.push(String::new());
        lines.push("A spoken reply is available: 'play' to hear it, 'save <path>' to keep it.".to_string());
    }

    lines.push(String::new());
    lines.push(format!("Disclaimer: {}", DISCLAIMER));

    lines.join("\n")
}

pub fn format_notice(message: &str) -> String {
    format!("! {}", message)
}

pub fn format_help() -> String {
    [
        "Commands:",
        "  record        start recording from the microphone",
        "  stop          stop recording and stage the audio",
        "  discard       drop the staged audio",
        "  image <path>  attach an image file",
        "  remove        drop the staged image",
        "  submit        send the staged artifacts for analysis",
        "  play          play the spoken reply of the last result",
        "  save <path>   write the spoken reply to a file",
        "  status        show the current workflow state",
        "  reset         clear everything and start over",
        "  quit          leave the session",
    ]
    .join("\n")
}

/// Decode and play a fetched audio reply, returning once it finishes.
pub async fn play_audio(data: Vec<u8>) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let (_stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;
        sink.append(Decoder::new(Cursor::new(data))?);
        sink.sleep_until_end();
        Ok(())
    })
    .await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(transcription: Option<&str>, audio_url: Option<&str>) -> ConsultationResult {
        ConsultationResult {
            transcription: transcription.map(str::to_string),
            analysis: "with what I see, a mild strain".to_string(),
            audio_url: audio_url.map(str::to_string),
        }
    }

    #[test]
    fn result_rendering_always_carries_the_disclaimer() {
        let with_audio = format_result(&result(Some("my knee aches"), Some("/download-audio/r.mp3")));
        let without = format_result(&result(None, None));
        assert!(with_audio.contains(DISCLAIMER));
        assert!(without.contains(DISCLAIMER));
    }

    #[test]
    fn transcription_panel_only_renders_when_present() {
        let with = format_result(&result(Some("my knee aches"), None));
        let without = format_result(&result(None, None));
        assert!(with.contains("my knee aches"));
        assert!(!without.contains("transcribed"));
    }

    #[test]
    fn reply_hint_only_renders_when_audio_exists() {
        let with = format_result(&result(None, Some("/download-audio/r.mp3")));
        let without = format_result(&result(None, None));
        assert!(with.contains("'play'"));
        assert!(!without.contains("'play'"));
    }

    #[test]
    fn failed_status_shows_the_message() {
        let status = format_status(
            &WorkflowState::Failed("network error: request timed out".to_string()),
            &ConsultationInput::default(),
        );
        assert!(status.contains("request timed out"));
        assert!(status.contains("reset"));
    }

    #[test]
    fn ready_status_summarizes_artifacts() {
        let input = ConsultationInput {
            audio: Some(shared::AudioArtifact {
                data: vec![0; 64],
                sample_rate: 16000,
                channels: 1,
                duration_ms: 3200,
            }),
            image: None,
        };
        let status = format_status(&WorkflowState::Ready, &input);
        assert!(status.contains("3.2s"));
        assert!(status.contains("16000 Hz"));
    }
}
