//! Object detection model handle.
//!
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::RgbImage;
use ndarray::{s, ArrayViewD, Axis, Ix2};
use tract_onnx::prelude::*;

use crate::labels::LabelMap;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Bounding box as `[x_top_left, y_top_left, x_bottom_right, y_bottom_right]`.
pub type Bbox = [f32; 4];

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Grey value of the letterbox padding, as used during YOLO training.
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

/// Upper bound of detections kept per frame.
const MAX_DETECTIONS: usize = 300;

/// Detection as reported by a model, in pixel coordinates of the input frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_index: usize,
    pub confidence: f32,
    pub bbox: Bbox,
}

/// Read-only detector shared by all requests.
///
/// Implementations must be callable concurrently from several threads.
pub trait InferModel: Send + Sync {
    /// Detect objects on a single frame.
    fn run(&self, input: &RgbImage) -> Result<Vec<RawDetection>>;

    /// Number of classes the model predicts, if it can be determined.
    fn class_count(&self) -> Option<usize>;

    /// Label map shipped with the model.
    fn labels(&self) -> Option<&LabelMap> {
        None
    }
}

/// Tensor layout of the detector output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputLayout {
    /// `[1, 4 + classes, anchors]` with `(cx, cy, w, h)` boxes, needs NMS (YOLOv8).
    Anchors,
    /// `[1, detections, 6]` with `(x1, y1, x2, y2, score, class)` rows (YOLOv10).
    EndToEnd,
}

/// YOLO detector exported to ONNX, run with tract.
pub struct YoloModel {
    model: NnModel,
    layout: OutputLayout,
    width: u32,
    height: u32,
    class_count: Option<usize>,
    labels: Option<LabelMap>,
    min_confidence: f32,
    max_iou: f32,
}

impl YoloModel {
    /// Load and optimize the model once. `input_size` is the square side the model was
    /// exported with.
    pub fn new(
        path: impl AsRef<Path>,
        layout: OutputLayout,
        input_size: u32,
        min_confidence: f32,
        max_iou: f32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let onnx = tract_onnx::onnx();
        let proto = onnx
            .proto_model_for_path(path)
            .with_context(|| format!("failed to read model {}", path.display()))?;

        let labels = match proto
            .metadata_props
            .iter()
            .find(|entry| entry.key == "names")
        {
            Some(entry) => match LabelMap::from_model_metadata(&entry.value) {
                Ok(labels) => Some(labels),
                Err(e) => {
                    log::warn!("Ignoring unreadable class names in model metadata: {e:#}");
                    None
                }
            },
            None => None,
        };

        let side = input_size as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side));
        let optimized = onnx
            .model_for_proto_model(&proto)?
            .with_input_fact(0, input_fact)?
            .into_optimized()?;

        let output_shape = optimized
            .output_fact(0)?
            .shape
            .as_concrete()
            .map(|shape| shape.to_vec());
        log::info!("Model {} has output shape {:?}", path.display(), output_shape);

        let class_count = match layout {
            OutputLayout::Anchors => output_shape
                .as_ref()
                .and_then(|shape| shape.get(1))
                .and_then(|features| features.checked_sub(4)),
            OutputLayout::EndToEnd => labels.as_ref().map(LabelMap::len),
        };

        let model = optimized.into_runnable()?;

        Ok(Self {
            model,
            layout,
            width: input_size,
            height: input_size,
            class_count,
            labels,
            min_confidence,
            max_iou,
        })
    }

    fn preproc(&self, input: &RgbImage) -> (Tensor, Letterbox) {
        let letterbox = Letterbox::new(input.dimensions(), (self.width, self.height));
        let (scaled_width, scaled_height) = letterbox.scaled;
        let (pad_x, pad_y) = letterbox.pad;

        let resized: RgbImage = image::imageops::resize(
            input,
            scaled_width,
            scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let tensor: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, c, y, x)| {
                let (x, y) = (x as u32, y as u32);
                if x >= pad_x && y >= pad_y && x - pad_x < scaled_width && y - pad_y < scaled_height
                {
                    resized[(x - pad_x, y - pad_y)][c] as f32 / 255.0
                } else {
                    LETTERBOX_FILL
                }
            },
        )
        .into();

        (tensor, letterbox)
    }

    fn postproc(&self, output: ArrayViewD<f32>, letterbox: &Letterbox) -> Result<Vec<RawDetection>> {
        let candidates = match self.layout {
            OutputLayout::Anchors => {
                let candidates = decode_anchors(output, self.min_confidence)?;
                non_maximum_suppression(candidates, self.max_iou)
            }
            OutputLayout::EndToEnd => decode_end_to_end(output, self.min_confidence)?,
        };

        Ok(candidates
            .into_iter()
            .take(MAX_DETECTIONS)
            .map(|detection| RawDetection {
                bbox: letterbox.restore(&detection.bbox),
                ..detection
            })
            .filter(|detection| bbox_area(&detection.bbox) > 0.0)
            .collect())
    }
}

impl InferModel for YoloModel {
    fn run(&self, input: &RgbImage) -> Result<Vec<RawDetection>> {
        let (tensor, letterbox) = self.preproc(input);
        let raw_nn_out = self.model.run(tvec!(tensor.into()))?;
        let output = raw_nn_out
            .first()
            .context("model produced no output")?
            .to_array_view::<f32>()?;

        self.postproc(output, &letterbox)
    }

    fn class_count(&self) -> Option<usize> {
        self.class_count
    }

    fn labels(&self) -> Option<&LabelMap> {
        self.labels.as_ref()
    }
}

/// Aspect preserving resize into the model input with centered padding.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    scaled: (u32, u32),
    pad: (u32, u32),
    source: (u32, u32),
}

impl Letterbox {
    fn new(source: (u32, u32), target: (u32, u32)) -> Self {
        let (source_width, source_height) = (source.0.max(1), source.1.max(1));
        let scale = f32::min(
            target.0 as f32 / source_width as f32,
            target.1 as f32 / source_height as f32,
        );
        let scaled = (
            ((source_width as f32 * scale).round() as u32).clamp(1, target.0),
            ((source_height as f32 * scale).round() as u32).clamp(1, target.1),
        );
        let pad = ((target.0 - scaled.0) / 2, (target.1 - scaled.1) / 2);

        Self {
            scale,
            scaled,
            pad,
            source,
        }
    }

    /// Map a box from model input coordinates back onto the source frame, clamped to it.
    fn restore(&self, bbox: &Bbox) -> Bbox {
        let (pad_x, pad_y) = (self.pad.0 as f32, self.pad.1 as f32);
        let (width, height) = (self.source.0 as f32, self.source.1 as f32);
        [
            ((bbox[0] - pad_x) / self.scale).clamp(0.0, width),
            ((bbox[1] - pad_y) / self.scale).clamp(0.0, height),
            ((bbox[2] - pad_x) / self.scale).clamp(0.0, width),
            ((bbox[3] - pad_y) / self.scale).clamp(0.0, height),
        ]
    }
}

/// Decode `[1, 4 + classes, anchors]` output into candidates above `min_confidence`.
fn decode_anchors(output: ArrayViewD<f32>, min_confidence: f32) -> Result<Vec<RawDetection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        bail!("unexpected output shape {:?} for anchor layout", shape);
    }
    let features = output.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;

    let mut candidates = vec![];
    for anchor in features.columns() {
        let (class_index, confidence) = anchor
            .slice(s![4..])
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (index, score)| {
                if score > best.1 {
                    (index, score)
                } else {
                    best
                }
            });

        // Also rejects NaN scores
        if !(confidence >= min_confidence) {
            continue;
        }

        let (cx, cy, w, h) = (anchor[0], anchor[1], anchor[2], anchor[3]);
        if !(w > 0.0 && h > 0.0) || !cx.is_finite() || !cy.is_finite() {
            continue;
        }

        candidates.push(RawDetection {
            class_index,
            confidence: confidence.min(1.0),
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        });
    }

    Ok(candidates)
}

/// Decode `[1, detections, 6]` output of NMS-free models.
fn decode_end_to_end(output: ArrayViewD<f32>, min_confidence: f32) -> Result<Vec<RawDetection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[2] != 6 {
        bail!("unexpected output shape {:?} for end-to-end layout", shape);
    }
    let rows = output.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;

    let mut detections: Vec<RawDetection> = rows
        .rows()
        .into_iter()
        .filter(|row| row[4] >= min_confidence && row[5] >= 0.0)
        .filter(|row| row[2] >= row[0] && row[3] >= row[1])
        .map(|row| RawDetection {
            class_index: row[5].round() as usize,
            confidence: row[4].min(1.0),
            bbox: [row[0], row[1], row[2], row[3]],
        })
        .collect();

    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    Ok(detections)
}

/// Run class-aware non-maximum-suppression on candidate detections.
///
/// Start with the most confident candidate and iterate over all others in the order of sinking
/// confidence. A candidate is kept only if it does not overlap with an already selected
/// detection of the same class by more than `max_iou`. The result is sorted by descending
/// confidence.
fn non_maximum_suppression(mut candidates: Vec<RawDetection>, max_iou: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

    let mut selected: Vec<RawDetection> = vec![];
    'candidates: while let Some(candidate) = candidates.pop() {
        for chosen in selected.iter() {
            if chosen.class_index == candidate.class_index
                && iou(&candidate.bbox, &chosen.bbox) > max_iou
            {
                continue 'candidates;
            }
        }
        selected.push(candidate);
        if selected.len() == MAX_DETECTIONS {
            break;
        }
    }

    selected
}

/// Calculate the intersection-over-union metric for two bounding boxes.
fn iou(bbox_a: &Bbox, bbox_b: &Bbox) -> f32 {
    // If the boxes do not overlap, the corner points of the overlap box are swapped and its
    // area is zero.
    let overlap_box: Bbox = [
        f32::max(bbox_a[0], bbox_b[0]),
        f32::max(bbox_a[1], bbox_b[1]),
        f32::min(bbox_a[2], bbox_b[2]),
        f32::min(bbox_a[3], bbox_b[3]),
    ];

    let overlap_area = bbox_area(&overlap_box);

    overlap_area / (bbox_area(bbox_a) + bbox_area(bbox_b) - overlap_area + EPS)
}

/// Calculate the area enclosed by a bounding box, zero for ill-defined boxes.
fn bbox_area(bbox: &Bbox) -> f32 {
    let width = bbox[2] - bbox[0];
    let height = bbox[3] - bbox[1];
    if width < 0.0 || height < 0.0 {
        return 0.0;
    }

    width * height
}
