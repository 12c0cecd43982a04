//! maskwatch-hw: frame sources for the live annotation loop.
//!
//! Provides still-image replay and V4L2-based camera capture, both
//! delivering RGB frames.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::{load_rgb, CaptureError, FrameSource, StillImageSource};
