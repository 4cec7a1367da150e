//! Output backends that receive synthesized frames.

pub mod observer;
pub mod sink;
#[cfg(target_os = "linux")]
pub mod v4l2_loopback;

pub use observer::{FrameObserver, ObserverOutput};
pub use sink::{Discontinuity, SinkOutput, StreamSink, TimedSample};
#[cfg(target_os = "linux")]
pub use v4l2_loopback::{V4l2LoopbackConfig, V4l2LoopbackSink};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;
use crate::frame::Frame;

/// Where frames go. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Package frames as timed samples for a stream sink (default)
    #[default]
    Sink,
    /// Hand frames to an in-process observer callback
    Observer,
}

/// Trait for frame output backends.
pub trait OutputBackend: Send {
    /// Deliver one frame. Called on the frame clock thread.
    fn deliver(&mut self, frame: Frame) -> Result<(), DeliveryError>;

    fn mode(&self) -> OutputMode;
}
