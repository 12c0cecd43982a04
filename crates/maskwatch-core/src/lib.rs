//! maskwatch-core: mask classification and face region detection.
//!
//! Classifies images as mask / no mask with a MobileNetV2-style classifier
//! and locates faces with the ResNet-10 SSD detector, both running via
//! ONNX Runtime for CPU inference.

pub mod annotate;
pub mod classifier;
pub mod detector;
pub mod labels;
pub mod types;

pub use classifier::{ClassifierError, ClassifierOptions, MaskClassifier};
pub use detector::{DetectorError, FaceLocator, FaceRegionDetector};
pub use labels::{load_labels, LabelError, LabelSet};
pub use types::{Classification, FaceRegion, MaskState, MaskVerdict, ModelPrecision, Prediction};
