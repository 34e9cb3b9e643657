//! Decoding of submitted frames and encoding of annotated ones.
//!
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};

use crate::error::FrameError;

/// Decode a data URL into an RGB pixel buffer.
///
/// JPEG payloads are decompressed with libjpeg-turbo, everything else goes through `image`.
pub fn decode_frame(data_url: &str) -> Result<RgbImage, FrameError> {
    let payload = common::data_url::payload(data_url)
        .ok_or_else(|| FrameError::Decode("frame is not a data URL".into()))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| FrameError::Decode(e.into()))?;

    decode_image(&bytes)
}

/// Decode compressed image bytes.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, FrameError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => {
            turbojpeg::decompress_image(bytes).map_err(|e| FrameError::Decode(e.into()))
        }
        Ok(format) => image::load_from_memory_with_format(bytes, format)
            .map(|image| image.to_rgb8())
            .map_err(|e| FrameError::Decode(e.into())),
        Err(e) => Err(FrameError::Decode(e.into())),
    }
}

/// Encode a frame as base64 JPEG.
pub fn encode_frame(frame: &RgbImage, quality: i32) -> Result<String, FrameError> {
    let jpeg = turbojpeg::compress_image(frame, quality, turbojpeg::Subsamp::Sub2x2)
        .map_err(|e| FrameError::Encode(e.into()))?;

    Ok(STANDARD.encode(&jpeg[..]))
}
