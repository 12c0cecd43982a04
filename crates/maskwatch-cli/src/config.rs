use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_FACE_MODEL: &str = "face_detector/res10_300x300_ssd_iter_140000.onnx";
const DEFAULT_WINDOW_TITLE: &str = "Frame";
const DEFAULT_WARMUP_FRAMES: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Live-loop configuration: defaults, then an optional TOML file, then
/// `MASKWATCH_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// ONNX export of the ResNet-10 SSD face detector.
    pub face_model: PathBuf,
    /// V4L2 device to read live frames from; `None` replays the input image.
    pub camera_device: Option<String>,
    /// Title of the display window.
    pub window_title: String,
    /// Frames to discard after opening a camera (auto exposure settling).
    pub warmup_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            face_model: PathBuf::from(DEFAULT_FACE_MODEL),
            camera_device: None,
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
            warmup_frames: DEFAULT_WARMUP_FRAMES,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay `MASKWATCH_*` variables looked up through `var`.
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("MASKWATCH_FACE_MODEL") {
            self.face_model = PathBuf::from(path);
        }
        if let Some(device) = var("MASKWATCH_CAMERA_DEVICE") {
            self.camera_device = Some(device).filter(|d| !d.is_empty());
        }
        if let Some(title) = var("MASKWATCH_WINDOW_TITLE") {
            self.window_title = title;
        }
        if let Some(frames) = var("MASKWATCH_WARMUP_FRAMES") {
            match frames.parse() {
                Ok(n) => self.warmup_frames = n,
                Err(_) => tracing::warn!(value = %frames, "ignoring invalid MASKWATCH_WARMUP_FRAMES"),
            }
        }
    }
}
