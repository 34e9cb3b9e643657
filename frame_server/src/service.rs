//! The frame processing operation.
//!
use std::sync::Arc;

use anyhow::{bail, Result};
use common::protocol::{DetectionRecord, FrameResponse};

use crate::{
    annotate::Annotator,
    codec::{decode_frame, encode_frame},
    error::FrameError,
    labels::LabelMap,
    nn::{InferModel, RawDetection},
};

/// Behavior switches of the service.
///
/// The default turns every switch off, like the server's command line flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    /// Attach `x`, `y`, `width` and `height` to every detection.
    pub geometry: bool,
    /// Round confidences up to two decimal places.
    pub round_confidence: bool,
    /// Draw detections and return the re-encoded frame.
    pub annotate: bool,
    /// JPEG quality of annotated frames.
    pub jpeg_quality: i32,
}

impl ServiceOptions {
    /// Geometry, rounded confidences and an annotated frame.
    pub fn annotated() -> Self {
        Self {
            geometry: true,
            round_confidence: true,
            annotate: true,
            ..Default::default()
        }
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            geometry: false,
            round_confidence: false,
            annotate: false,
            jpeg_quality: 90,
        }
    }
}

/// Stateless frame processor around a shared model handle.
pub struct FrameService {
    model: Arc<dyn InferModel>,
    labels: LabelMap,
    annotator: Annotator,
    options: ServiceOptions,
}

impl FrameService {
    /// Build the service, failing when the label map does not fit the model.
    pub fn new(
        model: Arc<dyn InferModel>,
        labels: LabelMap,
        annotator: Annotator,
        options: ServiceOptions,
    ) -> Result<Self> {
        match model.class_count() {
            Some(class_count) => labels.validate(class_count)?,
            None => log::warn!(
                "Model does not report its class count, {} labels are not validated",
                labels.len()
            ),
        }
        if !(1..=100).contains(&options.jpeg_quality) {
            bail!("JPEG quality {} is outside 1..=100", options.jpeg_quality);
        }

        Ok(Self {
            model,
            labels,
            annotator,
            options,
        })
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn options(&self) -> ServiceOptions {
        self.options
    }

    /// Detect objects on one data URL encoded frame.
    pub fn process_frame(&self, encoded_image: &str) -> Result<FrameResponse, FrameError> {
        let mut frame = decode_frame(encoded_image)?;
        log::debug!("Frame decoded ({}x{})", frame.width(), frame.height());

        let raw_detections = self
            .model
            .run(&frame)
            .map_err(|e| FrameError::Inference(e.into()))?;
        log::debug!("Inference done, {} detections", raw_detections.len());

        let mut detections = Vec::with_capacity(raw_detections.len());
        for raw in raw_detections.iter() {
            let class = self.labels.get(raw.class_index).ok_or_else(|| {
                FrameError::Inference(
                    format!(
                        "class index {} outside label map of {} classes",
                        raw.class_index,
                        self.labels.len()
                    )
                    .into(),
                )
            })?;
            detections.push(self.to_record(raw, class));
        }

        let image = if self.options.annotate {
            for (raw, record) in raw_detections.iter().zip(detections.iter()) {
                let caption = format!("{} {:.2}", record.class, record.confidence);
                self.annotator.draw(&mut frame, &raw.bbox, &caption);
            }
            let encoded = encode_frame(&frame, self.options.jpeg_quality)?;
            log::debug!("Frame encoded ({} base64 bytes)", encoded.len());
            Some(encoded)
        } else {
            None
        };

        Ok(FrameResponse { detections, image })
    }

    fn to_record(&self, raw: &RawDetection, class: &str) -> DetectionRecord {
        let confidence = raw.confidence.clamp(0.0, 1.0);
        let confidence = match self.options.round_confidence {
            true => round_up_hundredths(confidence),
            false => confidence,
        };

        let record = DetectionRecord::new(class.to_owned(), confidence);
        match self.options.geometry {
            true => {
                let [x1, y1, x2, y2] = raw.bbox.map(|v| v.max(0.0).round() as u32);
                record.with_geometry(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
            }
            false => record,
        }
    }
}

/// Round up to two decimal places, staying within `[0, 1]`.
fn round_up_hundredths(confidence: f32) -> f32 {
    // Round first to absorb float noise such as 0.57 * 100 = 57.000004
    let hundredths = (confidence as f64 * 100.0 * 1e4).round() / 1e4;
    (hundredths.ceil() / 100.0).clamp(0.0, 1.0) as f32
}
