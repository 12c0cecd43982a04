use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Face rectangle in pixel coordinates, inclusive on both ends.
///
/// Always satisfies `0 <= start_x <= end_x <= width - 1` (and likewise for y)
/// for the frame it was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub start_x: u32,
    pub start_y: u32,
    pub end_x: u32,
    pub end_y: u32,
    pub confidence: f32,
}

impl FaceRegion {
    /// Build a region from pixel-space corners, truncating toward zero and
    /// clipping to a `width` × `height` frame.
    ///
    /// Returns `None` for an empty frame.
    pub fn clipped(
        corners: [f32; 4],
        width: u32,
        height: u32,
        confidence: f32,
    ) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = i64::from(width) - 1;
        let max_y = i64::from(height) - 1;

        // `as` saturates and maps NaN to 0.
        let start_x = (corners[0] as i64).clamp(0, max_x);
        let start_y = (corners[1] as i64).clamp(0, max_y);
        let end_x = (corners[2] as i64).clamp(start_x, max_x);
        let end_y = (corners[3] as i64).clamp(start_y, max_y);

        Some(Self {
            start_x: start_x as u32,
            start_y: start_y as u32,
            end_x: end_x as u32,
            end_y: end_y as u32,
            confidence,
        })
    }

    pub fn width(&self) -> u32 {
        self.end_x - self.start_x + 1
    }

    pub fn height(&self) -> u32 {
        self.end_y - self.start_y + 1
    }
}

/// How a classifier's input is fed and its output read back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelPrecision {
    /// float32 input normalized as `(raw - mean) / std`; scores are reported as-is.
    Floating { mean: f32, std: f32 },
    /// uint8 input passed through unchanged; scores are rescaled by 1/255.
    Quantized,
}

impl ModelPrecision {
    /// Map a raw pixel value into the floating input distribution.
    ///
    /// Quantized models take raw bytes, so this is the identity there.
    pub fn normalize(&self, raw: u8) -> f32 {
        match *self {
            ModelPrecision::Floating { mean, std } => (raw as f32 - mean) / std,
            ModelPrecision::Quantized => raw as f32,
        }
    }

    /// Convert a raw output score into a reported confidence.
    pub fn confidence(&self, score: f32) -> f32 {
        match self {
            ModelPrecision::Floating { .. } => score,
            ModelPrecision::Quantized => score / 255.0,
        }
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self, ModelPrecision::Quantized)
    }
}

/// One ranked class from a classification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// Result of a single classification pass.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Top-ranked classes, highest confidence first.
    pub predictions: Vec<Prediction>,
    /// Confidence for every class, in output-index order.
    pub confidences: Vec<f32>,
    /// Wall-clock time of the forward pass alone.
    pub inference_time: Duration,
}

impl Classification {
    pub fn inference_ms(&self) -> f64 {
        self.inference_time.as_secs_f64() * 1000.0
    }
}

/// Mask / no-mask decision shown next to a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskState {
    Mask,
    NoMask,
}

impl MaskState {
    pub fn label(&self) -> &'static str {
        match self {
            MaskState::Mask => "Mask",
            MaskState::NoMask => "No Mask",
        }
    }

    /// Overlay colour as RGB: green for a mask, red otherwise.
    pub fn color(&self) -> [u8; 3] {
        match self {
            MaskState::Mask => [0, 255, 0],
            MaskState::NoMask => [255, 0, 0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskVerdict {
    pub state: MaskState,
    /// Confidence of the winning class in [0, 1] for well-formed models.
    pub confidence: f32,
}

impl MaskVerdict {
    /// Decide from per-class confidences where index 0 is "Mask" and index 1
    /// is "No Mask". Ties go to "No Mask".
    ///
    /// Returns `None` when fewer than two classes are available.
    pub fn from_confidences(confidences: &[f32]) -> Option<Self> {
        let (&mask, &no_mask) = (confidences.first()?, confidences.get(1)?);
        let state = if mask > no_mask {
            MaskState::Mask
        } else {
            MaskState::NoMask
        };
        Some(Self {
            state,
            confidence: mask.max(no_mask),
        })
    }

    /// Overlay text, e.g. `Mask: 97.31%`.
    pub fn caption(&self) -> String {
        format!("{}: {:.2}%", self.state.label(), self.confidence * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipped_inside_frame() {
        let region = FaceRegion::clipped([10.7, 20.2, 50.9, 60.0], 100, 100, 0.9).unwrap();
        assert_eq!(
            (region.start_x, region.start_y, region.end_x, region.end_y),
            (10, 20, 50, 60)
        );
        assert_eq!(region.width(), 41);
    }

    #[test]
    fn test_clipped_to_bounds() {
        let region = FaceRegion::clipped([-30.0, -5.0, 400.0, 900.0], 320, 240, 0.8).unwrap();
        assert_eq!(
            (region.start_x, region.start_y, region.end_x, region.end_y),
            (0, 0, 319, 239)
        );
    }

    #[test]
    fn test_clipped_inverted_box_collapses() {
        // start beyond the right edge and end before start
        let region = FaceRegion::clipped([500.0, 300.0, 10.0, 5.0], 320, 240, 0.7).unwrap();
        assert!(region.start_x <= region.end_x);
        assert!(region.start_y <= region.end_y);
        assert_eq!(region.end_x, 319);
        assert_eq!(region.end_y, 239);
    }

    #[test]
    fn test_clipped_nan_and_infinite() {
        let region =
            FaceRegion::clipped([f32::NAN, f32::NEG_INFINITY, f32::INFINITY, f32::NAN], 64, 48, 0.6)
                .unwrap();
        assert!(region.start_x <= region.end_x && region.end_x <= 63);
        assert!(region.start_y <= region.end_y && region.end_y <= 47);
    }

    #[test]
    fn test_clipped_empty_frame() {
        assert!(FaceRegion::clipped([0.0, 0.0, 1.0, 1.0], 0, 10, 0.9).is_none());
    }

    #[test]
    fn test_floating_precision() {
        let p = ModelPrecision::Floating { mean: 127.5, std: 127.5 };
        assert!((p.normalize(255) - 1.0).abs() < 1e-6);
        assert!((p.normalize(0) + 1.0).abs() < 1e-6);
        assert_eq!(p.confidence(0.9), 0.9);
        assert!(!p.is_quantized());
    }

    #[test]
    fn test_quantized_precision() {
        let p = ModelPrecision::Quantized;
        assert_eq!(p.normalize(200), 200.0);
        assert!((p.confidence(200.0) - 0.784).abs() < 1e-3);
        assert!((p.confidence(55.0) - 0.216).abs() < 1e-3);
        assert!(p.is_quantized());
    }

    #[test]
    fn test_verdict_mask() {
        let v = MaskVerdict::from_confidences(&[0.9, 0.1]).unwrap();
        assert_eq!(v.state, MaskState::Mask);
        assert_eq!(v.caption(), "Mask: 90.00%");
        assert_eq!(v.state.color(), [0, 255, 0]);
    }

    #[test]
    fn test_verdict_no_mask_on_tie() {
        let v = MaskVerdict::from_confidences(&[0.5, 0.5]).unwrap();
        assert_eq!(v.state, MaskState::NoMask);
        assert_eq!(v.state.color(), [255, 0, 0]);
    }

    #[test]
    fn test_verdict_needs_two_classes() {
        assert!(MaskVerdict::from_confidences(&[1.0]).is_none());
        assert!(MaskVerdict::from_confidences(&[]).is_none());
    }
}
