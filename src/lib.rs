//! OffcutsCam: a virtual camera that streams one of two still images.
//!
//! A single stream shows either the "clear" or the "obstructed" image at a
//! fixed frame rate. A "change active image" notification flips between them.

pub mod assets;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod frame;
pub mod output;
pub mod pixel;
pub mod provider;

pub use assets::{AssetBundle, ImageState};
pub use bridge::{NotificationCenter, NotificationName, SignalFile};
pub use config::CameraConfig;
pub use device::Device;
pub use error::{Error, Result};
pub use frame::{FormatDescriptor, Frame, PixelEncoding};
pub use output::{OutputBackend, OutputMode};
pub use provider::Provider;
