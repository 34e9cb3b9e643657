//! JSON contract of the `/process_frame` endpoint.
//!
use serde::{Deserialize, Serialize};

/// Fixed message returned for every failed frame.
pub const FRAME_ERROR_MESSAGE: &str = "Error processing frame";

/// Request body: a single frame as data URL.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct FrameRequest {
    pub image: String,
}

impl FrameRequest {
    pub fn new(image: String) -> Self {
        Self { image }
    }
}

/// One detected object instance.
///
/// Geometry is in pixels of the submitted frame with the origin at the top left. It is only
/// present when the server is configured to expose it.
#[derive(Debug, Clone, Deserialize, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub class: String,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl DetectionRecord {
    pub fn new(class: String, confidence: f32) -> Self {
        Self {
            class,
            confidence,
            x: None,
            y: None,
            width: None,
            height: None,
        }
    }

    pub fn with_geometry(mut self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self.width = Some(width);
        self.height = Some(height);
        self
    }
}

/// Response body of a successfully processed frame.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Serialize)]
pub struct FrameResponse {
    pub detections: Vec<DetectionRecord>,
    /// Base64 encoded JPEG of the annotated frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Response body of a failed frame.
#[derive(Debug, Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn frame_error() -> Self {
        Self {
            error: FRAME_ERROR_MESSAGE.to_owned(),
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::Error;

    #[test]
    fn test_detection_without_geometry() -> Result<(), Error> {
        let record = DetectionRecord::new("person".into(), 0.87);
        let json = serde_json::to_value(&record)?;

        assert_eq!(json, serde_json::json!({"class": "person", "confidence": 0.87_f32}));

        Ok(())
    }

    #[test]
    fn test_detection_with_geometry() -> Result<(), Error> {
        let record = DetectionRecord::new("dog".into(), 0.5).with_geometry(10, 20, 30, 40);
        let json = serde_json::to_value(&record)?;

        assert_eq!(json["x"], 10);
        assert_eq!(json["y"], 20);
        assert_eq!(json["width"], 30);
        assert_eq!(json["height"], 40);

        Ok(())
    }

    #[test]
    fn test_response_omits_missing_image() -> Result<(), Error> {
        let response = FrameResponse::default();
        let serialized = serde_json::to_string(&response)?;

        assert_eq!(serialized, r#"{"detections":[]}"#);

        let deserialized: FrameResponse = serde_json::from_str(&serialized)?;
        assert_eq!(deserialized, response);

        Ok(())
    }

    #[test]
    fn test_error_body() -> Result<(), Error> {
        let serialized = serde_json::to_string(&ErrorResponse::frame_error())?;
        assert_eq!(serialized, r#"{"error":"Error processing frame"}"#);

        Ok(())
    }
}
