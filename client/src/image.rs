use base64::Engine;
use log::debug;
use shared::{ConsultError, ImageArtifact};
use std::path::Path;

/// Media types accepted for the image slot, keyed by file extension. The
/// declared type is what gets validated; the bytes are not sniffed.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
];

pub fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, media_type)| *media_type)
}

/// Read an image file and build its `data:` URL preview. The caller may
/// simply retry with another path after a failure.
pub async fn select_file(path: &Path) -> Result<ImageArtifact, ConsultError> {
    let media_type = media_type_for(path).ok_or_else(|| {
        ConsultError::ReadFailure(format!("{} is not an image file", path.display()))
    })?;

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ConsultError::ReadFailure(format!("{}: {}", path.display(), e)))?;

    let preview = format!(
        "data:{};base64,{}",
        media_type,
        base64::engine::general_purpose::STANDARD.encode(&data)
    );
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("image")
        .to_string();

    debug!(
        "selected image {} ({} bytes, {})",
        file_name,
        data.len(),
        media_type
    );

    Ok(ImageArtifact {
        file_name,
        media_type: media_type.to_string(),
        data,
        preview,
    })
}
