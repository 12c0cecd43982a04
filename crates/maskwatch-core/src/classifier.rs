//! Mask classifier via ONNX Runtime.
//!
//! Runs a MobileNetV2-style image classifier exported to ONNX. The input
//! tensor's element type selects the precision: float32 inputs are mean/std
//! normalized, uint8 inputs receive raw pixels and their scores are rescaled
//! by 1/255 on the way out.

use crate::labels::LabelSet;
use crate::types::{Classification, ModelPrecision, Prediction};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::tensor::TensorElementType;
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

/// Number of ranked classes reported per pass.
pub const TOP_K: usize = 5;

const DEFAULT_INPUT_MEAN: f32 = 127.5;
const DEFAULT_INPUT_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("unsupported model input: {0}")]
    UnsupportedInput(String),
    #[error("unsupported model output: {0}")]
    UnsupportedOutput(String),
    #[error("input_std must be non-zero")]
    InvalidNormalization,
    #[error("label file has {labels} labels but the model produces {outputs} scores")]
    LabelCountMismatch { labels: usize, outputs: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Memory layout of the model's 4-D image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// batch, height, width, channels
    Nhwc,
    /// batch, channels, height, width
    Nchw,
}

/// Element type of the model's first output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputKind {
    Float,
    Byte,
}

/// Batched input tensor, one variant per precision.
#[derive(Debug)]
pub enum InputTensor {
    Float(Array4<f32>),
    Quantized(Array4<u8>),
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float(array) => array.shape(),
            InputTensor::Quantized(array) => array.shape(),
        }
    }
}

/// Runtime knobs for [`MaskClassifier::load`].
#[derive(Debug, Clone, Copy)]
pub struct ClassifierOptions {
    pub input_mean: f32,
    pub input_std: f32,
    /// Intra-op thread count; `None` keeps the runtime default.
    pub num_threads: Option<usize>,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            input_mean: DEFAULT_INPUT_MEAN,
            input_std: DEFAULT_INPUT_STD,
            num_threads: None,
        }
    }
}

/// Image classifier that scores mask / no-mask (or any label set).
pub struct MaskClassifier {
    session: Session,
    precision: ModelPrecision,
    layout: InputLayout,
    input_height: u32,
    input_width: u32,
    output_kind: OutputKind,
}

impl MaskClassifier {
    /// Load the classification model and inspect its input/output tensors.
    pub fn load(
        model_path: impl AsRef<Path>,
        options: &ClassifierOptions,
    ) -> Result<Self, ClassifierError> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }
        if options.input_std == 0.0 {
            return Err(ClassifierError::InvalidNormalization);
        }

        let mut builder = Session::builder()?;
        if let Some(threads) = options.num_threads {
            builder = builder.with_intra_threads(threads)?;
        }
        let session = builder.commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| (o.name(), o.dtype())).collect::<Vec<_>>(),
            "loaded classifier model"
        );

        let input = session
            .inputs()
            .first()
            .ok_or_else(|| ClassifierError::UnsupportedInput("model has no inputs".into()))?;
        let ValueType::Tensor { ty, shape, .. } = input.dtype() else {
            return Err(ClassifierError::UnsupportedInput("input is not a tensor".into()));
        };

        let precision = match ty {
            TensorElementType::Float32 => ModelPrecision::Floating {
                mean: options.input_mean,
                std: options.input_std,
            },
            TensorElementType::Uint8 => ModelPrecision::Quantized,
            other => {
                return Err(ClassifierError::UnsupportedInput(format!(
                    "element type {other:?} (need float32 or uint8)"
                )))
            }
        };

        let dims: Vec<i64> = shape.iter().copied().collect();
        let (layout, input_height, input_width) = discover_input_layout(&dims)?;

        let output = session
            .outputs()
            .first()
            .ok_or_else(|| ClassifierError::UnsupportedOutput("model has no outputs".into()))?;
        let output_kind = match output.dtype() {
            ValueType::Tensor {
                ty: TensorElementType::Float32,
                ..
            } => OutputKind::Float,
            ValueType::Tensor {
                ty: TensorElementType::Uint8,
                ..
            } => OutputKind::Byte,
            other => {
                return Err(ClassifierError::UnsupportedOutput(format!(
                    "{other:?} (need a float32 or uint8 tensor)"
                )))
            }
        };

        tracing::debug!(
            ?precision,
            ?layout,
            input_height,
            input_width,
            ?output_kind,
            "classifier tensor mapping"
        );

        Ok(Self {
            session,
            precision,
            layout,
            input_height,
            input_width,
            output_kind,
        })
    }

    pub fn precision(&self) -> ModelPrecision {
        self.precision
    }

    /// Spatial input size as (width, height).
    pub fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    /// Classify an RGB image and rank the top [`TOP_K`] labels.
    ///
    /// Only the forward pass is timed; resizing and ranking are not.
    pub fn classify(
        &mut self,
        image: &RgbImage,
        labels: &LabelSet,
    ) -> Result<Classification, ClassifierError> {
        let resized = imageops::resize(
            image,
            self.input_width,
            self.input_height,
            FilterType::CatmullRom,
        );
        let input = build_input(&resized, self.layout, &self.precision);

        let (outputs, inference_time) = match &input {
            InputTensor::Float(array) => {
                let tensor = TensorRef::from_array_view(array.view())?;
                let start = Instant::now();
                let outputs = self.session.run(ort::inputs![tensor])?;
                (outputs, start.elapsed())
            }
            InputTensor::Quantized(array) => {
                let tensor = TensorRef::from_array_view(array.view())?;
                let start = Instant::now();
                let outputs = self.session.run(ort::inputs![tensor])?;
                (outputs, start.elapsed())
            }
        };

        let scores: Vec<f32> = match self.output_kind {
            OutputKind::Float => {
                let (_, data) = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
                    ClassifierError::InferenceFailed(format!("score extraction: {e}"))
                })?;
                data.to_vec()
            }
            OutputKind::Byte => {
                let (_, data) = outputs[0].try_extract_tensor::<u8>().map_err(|e| {
                    ClassifierError::InferenceFailed(format!("score extraction: {e}"))
                })?;
                data.iter().map(|&v| v as f32).collect()
            }
        };
        drop(outputs);

        let (predictions, confidences) = rank_predictions(&scores, labels, &self.precision, TOP_K)?;

        tracing::debug!(
            inference_ms = inference_time.as_secs_f64() * 1000.0,
            top = ?predictions.first().map(|p| (&p.label, p.confidence)),
            "classified image"
        );

        Ok(Classification {
            predictions,
            confidences,
            inference_time,
        })
    }
}

/// Read layout and spatial size from a 4-D input shape.
///
/// A trailing dimension of 3 means NHWC; otherwise a channel dimension of 3
/// at position 1 means NCHW. Dynamic (non-positive) spatial sizes are rejected.
fn discover_input_layout(dims: &[i64]) -> Result<(InputLayout, u32, u32), ClassifierError> {
    if dims.len() != 4 {
        return Err(ClassifierError::UnsupportedInput(format!(
            "expected a 4-D image tensor, got shape {dims:?}"
        )));
    }

    let (layout, height, width) = if dims[3] == 3 {
        (InputLayout::Nhwc, dims[1], dims[2])
    } else if dims[1] == 3 {
        (InputLayout::Nchw, dims[2], dims[3])
    } else {
        return Err(ClassifierError::UnsupportedInput(format!(
            "no 3-channel dimension in shape {dims:?}"
        )));
    };

    match (u32::try_from(height), u32::try_from(width)) {
        (Ok(h), Ok(w)) if h > 0 && w > 0 => Ok((layout, h, w)),
        _ => Err(ClassifierError::UnsupportedInput(format!(
            "dynamic or invalid spatial size in shape {dims:?}"
        ))),
    }
}

/// Pack an already-resized RGB image into a batch-of-one tensor.
pub fn build_input(image: &RgbImage, layout: InputLayout, precision: &ModelPrecision) -> InputTensor {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let shape = match layout {
        InputLayout::Nhwc => (1, h, w, 3),
        InputLayout::Nchw => (1, 3, h, w),
    };
    let index = |x: usize, y: usize, c: usize| match layout {
        InputLayout::Nhwc => [0, y, x, c],
        InputLayout::Nchw => [0, c, y, x],
    };

    match precision {
        ModelPrecision::Floating { .. } => {
            let mut tensor = Array4::<f32>::zeros(shape);
            for (x, y, pixel) in image.enumerate_pixels() {
                for c in 0..3 {
                    tensor[index(x as usize, y as usize, c)] = precision.normalize(pixel[c]);
                }
            }
            InputTensor::Float(tensor)
        }
        ModelPrecision::Quantized => {
            let mut tensor = Array4::<u8>::zeros(shape);
            for (x, y, pixel) in image.enumerate_pixels() {
                for c in 0..3 {
                    tensor[index(x as usize, y as usize, c)] = pixel[c];
                }
            }
            InputTensor::Quantized(tensor)
        }
    }
}

/// Rank raw output scores against `labels`, keeping the best `k`.
///
/// Ordering is by descending raw score with ties left in index order.
/// Returns the ranked predictions and the confidence of every class.
pub fn rank_predictions(
    scores: &[f32],
    labels: &LabelSet,
    precision: &ModelPrecision,
    k: usize,
) -> Result<(Vec<Prediction>, Vec<f32>), ClassifierError> {
    if scores.len() != labels.len() {
        return Err(ClassifierError::LabelCountMismatch {
            labels: labels.len(),
            outputs: scores.len(),
        });
    }

    let confidences: Vec<f32> = scores.iter().map(|&s| precision.confidence(s)).collect();

    let mut order: Vec<usize> = (0..scores.len()).collect();
    // sort_by is stable, so equal scores keep index order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let predictions = order
        .into_iter()
        .take(k)
        .map(|index| Prediction {
            index,
            label: labels[index].to_string(),
            confidence: confidences[index],
        })
        .collect();

    Ok((predictions, confidences))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn labels(names: &[&str]) -> LabelSet {
        names.iter().copied().collect()
    }

    const FLOAT: ModelPrecision = ModelPrecision::Floating {
        mean: 127.5,
        std: 127.5,
    };

    #[test]
    fn test_rank_floating_scenario() {
        let (preds, confidences) =
            rank_predictions(&[0.9, 0.1], &labels(&["Mask", "No Mask"]), &FLOAT, TOP_K).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].label, "Mask");
        assert_eq!(preds[0].confidence, 0.9);
        assert_eq!(preds[1].label, "No Mask");
        assert_eq!(preds[1].confidence, 0.1);
        assert_eq!(confidences, vec![0.9, 0.1]);
    }

    #[test]
    fn test_rank_quantized_scenario() {
        let (preds, _) = rank_predictions(
            &[200.0, 55.0],
            &labels(&["Mask", "No Mask"]),
            &ModelPrecision::Quantized,
            TOP_K,
        )
        .unwrap();
        assert_eq!(preds[0].label, "Mask");
        assert!((preds[0].confidence - 0.784).abs() < 1e-3);
        assert_eq!(preds[1].label, "No Mask");
        assert!((preds[1].confidence - 0.216).abs() < 1e-3);
        assert!(preds.iter().all(|p| (0.0..=1.0).contains(&p.confidence)));
    }

    #[test]
    fn test_rank_keeps_top_five_descending() {
        let scores = [0.05, 0.3, 0.1, 0.2, 0.15, 0.12, 0.08];
        let names = ["a", "b", "c", "d", "e", "f", "g"];
        let (preds, _) = rank_predictions(&scores, &labels(&names), &FLOAT, TOP_K).unwrap();
        let order: Vec<usize> = preds.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 3, 4, 5, 2]);
    }

    #[test]
    fn test_rank_ties_keep_index_order() {
        let scores = [0.2, 0.5, 0.2, 0.5, 0.2];
        let names = ["a", "b", "c", "d", "e"];
        let (preds, _) = rank_predictions(&scores, &labels(&names), &FLOAT, TOP_K).unwrap();
        let order: Vec<usize> = preds.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_rank_orders_nan_scores_deterministically() {
        let mut scores = vec![0.0f32; 1000];
        for (i, score) in scores.iter_mut().enumerate() {
            *score = if i % 7 == 0 { f32::NAN } else { i as f32 / 1000.0 };
        }
        let names: Vec<String> = (0..scores.len()).map(|i| format!("c{i}")).collect();
        let labels: LabelSet = names.iter().map(String::as_str).collect();

        let (first, _) = rank_predictions(&scores, &labels, &FLOAT, TOP_K).unwrap();
        let (second, _) = rank_predictions(&scores, &labels, &FLOAT, TOP_K).unwrap();
        let order: Vec<usize> = first.iter().map(|p| p.index).collect();
        assert_eq!(order, second.iter().map(|p| p.index).collect::<Vec<_>>());

        // positive NaN sorts above every finite score, then finite scores descend
        assert!(first.iter().all(|p| p.confidence.is_nan()));
        assert_eq!(order, vec![0, 7, 14, 21, 28]);

        let finite: Vec<f32> = (0..10).map(|i| if i == 4 { f32::NAN } else { i as f32 }).collect();
        let names: Vec<String> = (0..finite.len()).map(|i| format!("c{i}")).collect();
        let labels: LabelSet = names.iter().map(String::as_str).collect();
        let (preds, _) = rank_predictions(&finite, &labels, &FLOAT, TOP_K).unwrap();
        let order: Vec<usize> = preds.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![4, 9, 8, 7, 6]);
    }

    #[test]
    fn test_rank_label_mismatch() {
        let err = rank_predictions(&[0.1, 0.2, 0.7], &labels(&["a", "b"]), &FLOAT, TOP_K)
            .unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::LabelCountMismatch { labels: 2, outputs: 3 }
        ));
    }

    #[test]
    fn test_discover_nhwc() {
        let (layout, h, w) = discover_input_layout(&[1, 224, 160, 3]).unwrap();
        assert_eq!(layout, InputLayout::Nhwc);
        assert_eq!((h, w), (224, 160));
    }

    #[test]
    fn test_discover_nchw() {
        let (layout, h, w) = discover_input_layout(&[1, 3, 128, 96]).unwrap();
        assert_eq!(layout, InputLayout::Nchw);
        assert_eq!((h, w), (128, 96));
    }

    #[test]
    fn test_discover_rejects_dynamic_and_bad_rank() {
        assert!(discover_input_layout(&[1, -1, -1, 3]).is_err());
        assert!(discover_input_layout(&[1, 224, 224]).is_err());
        assert!(discover_input_layout(&[1, 4, 224, 224]).is_err());
    }

    #[test]
    fn test_build_input_floating_nhwc() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([0, 255, 127]));
        image.put_pixel(1, 0, Rgb([255, 0, 0]));

        let InputTensor::Float(tensor) = build_input(&image, InputLayout::Nhwc, &FLOAT) else {
            panic!("expected a float tensor");
        };
        assert_eq!(tensor.shape(), &[1, 1, 2, 3]);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 0, 1]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 0, 2]] - (127.0 - 127.5) / 127.5).abs() < 1e-6);
        assert!((tensor[[0, 0, 1, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_build_input_quantized_nchw_is_raw() {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(2, 1, Rgb([10, 20, 30]));

        let input = build_input(&image, InputLayout::Nchw, &ModelPrecision::Quantized);
        assert_eq!(input.shape(), &[1, 3, 2, 3]);
        let InputTensor::Quantized(tensor) = input else {
            panic!("expected a quantized tensor");
        };
        assert_eq!(tensor[[0, 0, 1, 2]], 10);
        assert_eq!(tensor[[0, 1, 1, 2]], 20);
        assert_eq!(tensor[[0, 2, 1, 2]], 30);
        assert_eq!(tensor[[0, 0, 0, 0]], 0);
    }

    #[test]
    fn test_load_missing_model() {
        let err = MaskClassifier::load("/nonexistent/mask.onnx", &ClassifierOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::ModelNotFound(_)));
    }

    #[test]
    fn test_load_rejects_zero_std() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let options = ClassifierOptions {
            input_std: 0.0,
            ..ClassifierOptions::default()
        };
        let err = MaskClassifier::load(file.path(), &options).err().unwrap();
        assert!(matches!(err, ClassifierError::InvalidNormalization));
    }
}
