//! SSD face region detector via ONNX Runtime.
//!
//! Runs the ResNet-10 SSD 300×300 face detector and keeps the first
//! detection the network reports above the confidence threshold.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// SSD blob geometry and detection policy
const SSD_INPUT_SIZE: u32 = 300;
/// Per-channel means in blob order (B, G, R).
const SSD_CHANNEL_MEANS: [f32; 3] = [104.0, 177.0, 123.0];
/// Fixed policy: detections at or below this confidence are ignored.
pub const FACE_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Each detection row is [image_id, label, confidence, x1, y1, x2, y2].
const SSD_DETECTION_WIDTH: usize = 7;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Something that can find at most one face in a frame.
pub trait FaceLocator {
    fn locate(&mut self, frame: &RgbImage) -> Result<Option<FaceRegion>, DetectorError>;
}

/// SSD-based face region detector.
pub struct FaceRegionDetector {
    session: Session,
}

impl FaceRegionDetector {
    /// Load the SSD face detector ONNX model from the given path.
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, DetectorError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded SSD face detector"
        );

        Ok(Self { session })
    }

    /// Detect the first face above threshold in an RGB frame.
    pub fn detect(&mut self, frame: &RgbImage) -> Result<Option<FaceRegion>, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(None);
        }

        let input = preprocess(frame);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, detections) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("detections: {e}")))?;

        if detections.len() % SSD_DETECTION_WIDTH != 0 {
            return Err(DetectorError::InferenceFailed(format!(
                "detection tensor length {} is not a multiple of {SSD_DETECTION_WIDTH}",
                detections.len()
            )));
        }

        let region = first_face(detections, frame.width(), frame.height());
        tracing::trace!(?region, candidates = detections.len() / SSD_DETECTION_WIDTH, "face scan");
        Ok(region)
    }
}

impl FaceLocator for FaceRegionDetector {
    fn locate(&mut self, frame: &RgbImage) -> Result<Option<FaceRegion>, DetectorError> {
        self.detect(frame)
    }
}

/// Build the 1×3×300×300 blob: bilinear resize, BGR planes, mean subtraction,
/// no scaling.
fn preprocess(frame: &RgbImage) -> Array4<f32> {
    let size = SSD_INPUT_SIZE as usize;
    let resized = imageops::resize(frame, SSD_INPUT_SIZE, SSD_INPUT_SIZE, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y, x]] = b as f32 - SSD_CHANNEL_MEANS[0];
        tensor[[0, 1, y, x]] = g as f32 - SSD_CHANNEL_MEANS[1];
        tensor[[0, 2, y, x]] = r as f32 - SSD_CHANNEL_MEANS[2];
    }

    tensor
}

/// Scan detection rows in network order and return the first one whose
/// confidence exceeds [`FACE_CONFIDENCE_THRESHOLD`], scaled to the frame
/// and clipped to its bounds.
///
/// Later rows are never considered, even if they score higher.
pub fn first_face(detections: &[f32], width: u32, height: u32) -> Option<FaceRegion> {
    let (w, h) = (width as f32, height as f32);

    detections
        .chunks_exact(SSD_DETECTION_WIDTH)
        .find(|row| row[2] > FACE_CONFIDENCE_THRESHOLD)
        .and_then(|row| {
            FaceRegion::clipped(
                [row[3] * w, row[4] * h, row[5] * w, row[6] * h],
                width,
                height,
                row[2],
            )
        })
}
