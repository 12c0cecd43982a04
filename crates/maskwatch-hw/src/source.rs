//! Frame sources for the live loop.

use crate::frame::Frame;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("image file not found: {0}")]
    ImageNotFound(String),
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

/// Anything that yields RGB frames one at a time.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// Replays a single decoded image as an endless stream of frames.
///
/// Takes the image the classifier already decoded; each frame is a fresh
/// copy so annotations never accumulate.
pub struct StillImageSource {
    image: RgbImage,
    path: PathBuf,
    sequence: u32,
}

impl StillImageSource {
    /// Replay an already decoded image; `path` only labels the source in logs.
    pub fn from_image(image: RgbImage, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "opened still image source"
        );
        Self {
            image,
            path,
            sequence: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let frame = Frame::new(self.image.clone(), self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("image {}", self.path.display())
    }
}

/// Decode an image file into RGB8.
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage, CaptureError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CaptureError::ImageNotFound(path.display().to_string()));
    }
    let image = image::open(path).map_err(|source| CaptureError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    Ok(image.to_rgb8())
}
