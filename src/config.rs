//! YAML configuration for the camera.
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! stock camera: a 1080x720 BGRA stream at 1 fps showing `assets/clear.ppm`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::assets::{AssetBundle, ImageState};
use crate::bridge::SignalFile;
use crate::device::validate_format;
use crate::error::{PoolError, RegistrationError};
use crate::frame::{FormatDescriptor, PixelEncoding};
use crate::output::{ObserverOutput, OutputMode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device: DeviceConfig,
    pub stream: StreamConfig,
    pub assets: AssetConfig,
    pub initial_state: ImageState,
    pub output: OutputConfig,
    pub signal_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    /// Fixed device id. Derived from the name when unset.
    pub id: Option<Uuid>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "OffcutsCam".to_string(),
            model: "OffcutsCam Model".to_string(),
            manufacturer: "OffcutsCam Manufacturer".to_string(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub name: String,
    /// Fixed stream id. Derived from the name when unset.
    pub id: Option<Uuid>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub encoding: PixelEncoding,
    pub pool_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            name: "OffcutsCam.Video".to_string(),
            id: None,
            width: 1080,
            height: 720,
            frame_rate: 1,
            encoding: PixelEncoding::Bgra,
            pool_capacity: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub directory: PathBuf,
    pub clear: String,
    pub obstructed: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("assets"),
            clear: "clear.ppm".to_string(),
            obstructed: "obstructed.ppm".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    /// Frames the observer queue holds before new frames are dropped.
    pub observer_queue_depth: usize,
    /// v4l2loopback device for sink mode on Linux.
    pub loopback_device: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::Sink,
            observer_queue_depth: ObserverOutput::DEFAULT_QUEUE_DEPTH,
            loopback_device: None,
        }
    }
}

/// Stable id derived from a name, so the host sees the same device across launches.
fn derived_id(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

impl CameraConfig {
    /// Reads and validates a YAML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_yaml(&content).with_context(|| format!("parsing config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        validate_format(&self.format())?;
        if self.stream.pool_capacity == 0 {
            return Err(PoolError::ZeroCapacity.into());
        }
        if self.output.observer_queue_depth == 0 {
            return Err(RegistrationError::InvalidFormat(
                "observer queue depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn format(&self) -> FormatDescriptor {
        FormatDescriptor {
            width: self.stream.width,
            height: self.stream.height,
            encoding: self.stream.encoding,
            frame_rate: self.stream.frame_rate,
        }
    }

    pub fn device_id(&self) -> Uuid {
        self.device.id.unwrap_or_else(|| derived_id(&self.device.name))
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream.id.unwrap_or_else(|| derived_id(&self.stream.name))
    }

    pub fn asset_bundle(&self) -> AssetBundle {
        AssetBundle::new(&self.assets.directory, &self.assets.clear, &self.assets.obstructed)
    }

    pub fn signal_file(&self) -> SignalFile {
        match &self.signal_file {
            Some(path) => SignalFile::new(path),
            None => SignalFile::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = CameraConfig::from_yaml("").unwrap();
        assert_eq!(config, CameraConfig::default());
        assert_eq!(config.format().width, 1080);
        assert_eq!(config.format().height, 720);
        assert_eq!(config.format().frame_rate, 1);
        assert_eq!(config.format().encoding, PixelEncoding::Bgra);
        assert_eq!(config.stream.pool_capacity, 5);
        assert_eq!(config.initial_state, ImageState::Clear);
    }

    #[test]
    fn test_partial_yaml_overrides_fields() {
        let yaml = "
stream:
  width: 640
  height: 480
  encoding: argb
initial_state: obstructed
output:
  mode: observer
";
        let config = CameraConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.stream.width, 640);
        assert_eq!(config.stream.encoding, PixelEncoding::Argb);
        assert_eq!(config.stream.frame_rate, 1);
        assert_eq!(config.initial_state, ImageState::Obstructed);
        assert_eq!(config.output.mode, OutputMode::Observer);
        assert_eq!(config.device.name, "OffcutsCam");
    }

    #[test]
    fn test_ids_are_stable_and_overridable() {
        let config = CameraConfig::default();
        assert_eq!(config.device_id(), CameraConfig::default().device_id());
        assert_ne!(config.device_id(), config.stream_id());

        let fixed = Uuid::new_v4();
        let mut config = CameraConfig::default();
        config.device.id = Some(fixed);
        assert_eq!(config.device_id(), fixed);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(CameraConfig::from_yaml("stream:\n  width: 0\n").is_err());
        assert!(CameraConfig::from_yaml("stream:\n  frame_rate: 0\n").is_err());
        assert!(CameraConfig::from_yaml("stream:\n  pool_capacity: 0\n").is_err());
        assert!(CameraConfig::from_yaml("initial_state: foggy\n").is_err());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam.yaml");
        fs::write(&path, "device:\n  name: Test Cam\n").unwrap();

        let config = CameraConfig::load(&path).unwrap();
        assert_eq!(config.device.name, "Test Cam");
        assert!(CameraConfig::load(&dir.path().join("missing.yaml")).is_err());
    }
}
