use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::color::PixelFormat;
use crate::foundation::error::{SenseHatError, SenseHatResult};
use crate::service::DisplayConfig;

/// Process configuration for the HTTP service.
///
/// Every field has a default, so `{}` is a valid config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Framebuffer device the matrix is attached to.
    pub device: PathBuf,
    pub width: u8,
    pub height: u8,
    pub format: PixelFormat,
    /// Directory `/play/{file}` keys are resolved against.
    pub storage_root: PathBuf,
    /// `host:port` to bind the HTTP listener to.
    pub listen: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/fb1"),
            width: 8,
            height: 8,
            format: PixelFormat::Rgb565,
            storage_root: PathBuf::from("movies"),
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_reader<R: std::io::Read>(r: R) -> SenseHatResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| SenseHatError::validation(format!("parse config JSON: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> SenseHatResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            SenseHatError::validation(format!("open config JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    pub fn validate(&self) -> SenseHatResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SenseHatError::validation(
                "display width/height must be non-zero",
            ));
        }
        if self.device.as_os_str().is_empty() {
            return Err(SenseHatError::validation("device path must be non-empty"));
        }
        if self.listen.trim().is_empty() {
            return Err(SenseHatError::validation("listen address must be non-empty"));
        }
        Ok(())
    }

    pub fn display(&self) -> DisplayConfig {
        DisplayConfig {
            width: self.width,
            height: self.height,
            format: self.format,
        }
    }
}
