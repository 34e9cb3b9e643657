//! Command line configuration shared by the binaries.
//!
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::{
    labels::{LabelMap, LabelSource},
    nn::{InferModel, OutputLayout, YoloModel},
    utils::ensure_model,
};

/// Which detector to load and how to read its output.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path of the ONNX weights
    #[clap(long, default_value = "yolo-weights/yolov8n.onnx")]
    pub model: PathBuf,

    /// Download URL used when the weights are not found locally
    #[clap(long)]
    pub model_url: Option<String>,

    /// Output tensor layout of the model
    #[clap(long, value_enum, default_value_t = OutputLayout::Anchors)]
    pub layout: OutputLayout,

    /// Side length of the square model input
    #[clap(long, default_value_t = 640)]
    pub input_size: u32,

    /// Minimum confidence of a detection
    #[clap(long, default_value_t = 0.25)]
    pub min_confidence: f32,

    /// Maximum overlap of two detections of the same class
    #[clap(long, default_value_t = 0.45)]
    pub max_iou: f32,

    /// Class names: `coco`, `model` (from the model metadata) or a file with one name per line
    #[clap(long, default_value = "coco")]
    pub labels: LabelSource,
}

impl ModelArgs {
    /// Load the model once, fetching the weights first if needed.
    pub async fn load_model(&self) -> Result<YoloModel> {
        let path = ensure_model(&self.model, self.model_url.as_deref()).await?;
        log::info!("Loading model {}", path.display());

        let (layout, input_size, min_confidence, max_iou) =
            (self.layout, self.input_size, self.min_confidence, self.max_iou);
        tokio::task::spawn_blocking(move || {
            YoloModel::new(&path, layout, input_size, min_confidence, max_iou)
        })
        .await?
    }

    /// Resolve the configured label source against a loaded model.
    pub fn load_labels(&self, model: &dyn InferModel) -> Result<LabelMap> {
        match &self.labels {
            LabelSource::Coco => Ok(LabelMap::coco()),
            LabelSource::Model => model
                .labels()
                .cloned()
                .context("model metadata carries no class names"),
            LabelSource::File(path) => LabelMap::from_file(path),
        }
    }
}
