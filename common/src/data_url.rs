//! Data URL helpers.
//!
//! Frames travel as `data:<mime>;base64,<payload>`. Only the part after the first comma is
//! image data, the prefix is never interpreted.
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Split off the metadata prefix and return the base64 payload.
pub fn payload(data_url: &str) -> Option<&str> {
    data_url.split_once(',').map(|(_, payload)| payload)
}

/// Wrap raw image bytes into a data URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Guess the mime type of a file from its extension, defaulting to JPEG.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
