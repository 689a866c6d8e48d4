use thiserror::Error;

/// Failure taxonomy for the consultation workflow.
///
/// Every variant displays as a message safe to show the user. `ServerError`
/// keeps the raw response body out of its display output; the body is only
/// carried for logging.
#[derive(Debug, Error)]
pub enum ConsultError {
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),

    #[error("capture format not supported: {0}")]
    FormatUnsupported(String),

    #[error("could not read file: {0}")]
    ReadFailure(String),

    #[error("provide an audio recording or an image before submitting")]
    Validation,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("server returned status {status}")]
    ServerError { status: u16, body: String },
}
