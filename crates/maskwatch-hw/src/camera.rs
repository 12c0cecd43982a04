//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::source::{CaptureError, FrameSource};
use image::RgbImage;
use std::path::Path;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const EBUSY: i32 = 16;

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            Some(PixelFormat::Y16)
        } else {
            None
        }
    }
}

/// V4L2 camera with a streaming mmap queue that lives as long as the handle.
///
/// Streaming starts in [`Camera::open`] and stops when the handle drops,
/// so warm-up frames and live frames come from the same queue and sequence
/// numbers keep counting up. The stream shares the device handle, so the
/// descriptor stays open until the camera drops.
pub struct Camera {
    stream: MmapStream<'static>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    sequence: u32,
}

impl Camera {
    /// Open a V4L2 capture device (e.g. "/dev/video0") and negotiate a
    /// 640x480 format the frame converters understand.
    pub fn open(device_path: &str) -> Result<Self, CaptureError> {
        if !Path::new(device_path).exists() {
            return Err(CaptureError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.raw_os_error() {
            Some(code) if code == EBUSY => CaptureError::DeviceBusy,
            _ => CaptureError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CaptureError::CaptureFailed(format!("query_caps on {device_path}: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::StreamingNotSupported);
        }

        let (width, height, fourcc, pixel_format) = negotiate_format(&device)?;
        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CaptureError::CaptureFailed(format!("mmap stream: {e}")))?;
        tracing::info!(
            device = device_path,
            card = %caps.card,
            width,
            height,
            fourcc = %fourcc,
            "camera ready"
        );

        Ok(Self {
            stream,
            width,
            height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
            sequence: 0,
        })
    }

    /// Dequeue the next buffer from the session stream and convert it to RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let (width, height, format) = (self.width, self.height, self.pixel_format);
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CaptureError::CaptureFailed(format!("dequeue: {e}")))?;
        let sequence = meta.sequence;
        let rgb = convert_buffer(format, buf, width, height)?;

        let image = RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
            CaptureError::CaptureFailed("converted buffer does not match frame size".into())
        })?;

        self.sequence = sequence;
        Ok(Frame::new(image, sequence))
    }

    /// Discard `count` frames so auto exposure can settle.
    pub fn warm_up(&mut self, count: usize) -> Result<(), CaptureError> {
        for n in 0..count {
            let frame = self.capture_frame()?;
            tracing::debug!(
                n,
                seq = frame.sequence,
                brightness = frame.avg_brightness(),
                "discarded warmup frame"
            );
        }
        Ok(())
    }

    /// Probe `/dev/video0` through `/dev/video15` for capture-capable devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

/// Convert one raw driver buffer in `format` to packed RGB.
fn convert_buffer(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CaptureError> {
    let convert = match format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb,
        PixelFormat::Grey => frame::grey_to_rgb,
        PixelFormat::Y16 => frame::y16_to_rgb,
    };
    convert(buf, width, height)
        .map_err(|e| CaptureError::CaptureFailed(format!("{format:?} conversion: {e}")))
}

/// Request YUYV at the default size and accept whatever supported format the
/// driver settles on.
fn negotiate_format(device: &Device) -> Result<(u32, u32, FourCC, PixelFormat), CaptureError> {
    let mut fmt = device
        .format()
        .map_err(|e| CaptureError::FormatNegotiationFailed(format!("get format: {e}")))?;
    fmt.width = REQUESTED_WIDTH;
    fmt.height = REQUESTED_HEIGHT;
    fmt.fourcc = FourCC::new(b"YUYV");

    let fmt = device
        .set_format(&fmt)
        .map_err(|e| CaptureError::FormatNegotiationFailed(format!("set format: {e}")))?;

    match PixelFormat::from_fourcc(fmt.fourcc) {
        Some(pixel_format) => Ok((fmt.width, fmt.height, fmt.fourcc, pixel_format)),
        None => Err(CaptureError::FormatNegotiationFailed(format!(
            "driver chose {}, need YUYV, GREY or Y16",
            fmt.fourcc
        ))),
    }
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.capture_frame()
    }

    fn describe(&self) -> String {
        format!("camera {} ({}x{})", self.device_path, self.width, self.height)
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        tracing::debug!(
            device = %self.device_path,
            last_seq = self.sequence,
            "stopping stream and closing camera"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_camera_owns_its_stream() {
        fn owned<T: 'static>() {}
        owned::<MmapStream<'static>>();
        owned::<Camera>();
    }

    #[test]
    fn test_convert_buffer_per_format() {
        let grey = convert_buffer(PixelFormat::Grey, &[10, 20], 2, 1).unwrap();
        assert_eq!(grey, vec![10, 10, 10, 20, 20, 20]);

        let y16 = convert_buffer(PixelFormat::Y16, &[0x00, 0x80, 0xff, 0xff], 2, 1).unwrap();
        assert_eq!(y16, vec![0x80, 0x80, 0x80, 0xff, 0xff, 0xff]);

        let yuyv = convert_buffer(PixelFormat::Yuyv, &[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(yuyv.len(), 6);
    }

    #[test]
    fn test_convert_buffer_short_frame() {
        let err = convert_buffer(PixelFormat::Yuyv, &[100, 128], 2, 1).unwrap_err();
        assert!(matches!(err, CaptureError::CaptureFailed(_)));
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/video-does-not-exist").err().unwrap();
        assert!(matches!(err, CaptureError::DeviceNotFound(_)));
    }
}
