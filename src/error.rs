//! Error types for the virtual camera core.
//!
//! Asset, conversion and delivery errors are recoverable: they are logged and
//! the current tick or `start()` attempt is abandoned. Registration errors are
//! fatal at construction time.

use std::path::PathBuf;

use crate::assets::ImageState;
use crate::frame::PixelEncoding;

/// Result type for virtual camera operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to resolve a bundled image.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("{state} image not found at {}", path.display())]
    NotFound { state: ImageState, path: PathBuf },

    #[error("could not read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a decodable image: {source}", path.display())]
    Undecodable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Buffer pool failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("buffer pool exhausted ({capacity} buffers in flight)")]
    Exhausted { capacity: usize },

    #[error("buffer pool capacity must be at least 1")]
    ZeroCapacity,

    #[error("buffer pool format has zero area ({width}x{height})")]
    EmptyFormat { width: u32, height: u32 },
}

/// Failure to turn a decoded image into a stream pixel buffer.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("no pooled buffer available: {0}")]
    Pool(#[from] PoolError),

    #[error("could not acquire a {width}x{height} drawing context over {len} bytes")]
    DrawContext { width: u32, height: u32, len: usize },

    #[error("pixel data is {actual} bytes, {encoding:?} stream expects {expected}")]
    FormatMismatch {
        encoding: PixelEncoding,
        expected: usize,
        actual: usize,
    },
}

/// Failure to hand a frame to its destination.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("frame cannot be packaged into a timed sample: {0}")]
    Packaging(String),

    #[error("observer is still busy with earlier frames, frame dropped")]
    ObserverBusy,

    #[error("observer thread has shut down")]
    ObserverGone,

    #[error("stream sink rejected the sample: {0}")]
    Sink(String),
}

/// Failure to register the device or its stream. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("invalid stream format: {0}")]
    InvalidFormat(String),

    #[error("invalid active format index {0}, only index 0 is offered")]
    InvalidFormatIndex(usize),

    #[error("could not create buffer pool: {0}")]
    Pool(#[from] PoolError),
}

/// Umbrella error for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),
}
