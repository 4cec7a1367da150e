//! The device's single video stream.

use tracing::{error, info};
use uuid::Uuid;

use crate::device::properties::{StreamProperties, StreamProperty};
use crate::error::RegistrationError;
use crate::frame::FormatDescriptor;

/// Highest frame rate a stream may be declared with.
pub const MAX_FRAME_RATE: u32 = 240;

/// A named stream with exactly one format. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Stream {
    id: Uuid,
    name: String,
    format: FormatDescriptor,
}

impl Stream {
    pub fn new(id: Uuid, name: impl Into<String>, format: FormatDescriptor) -> Result<Self, RegistrationError> {
        validate_format(&format)?;
        let name = name.into();
        info!(
            "Stream '{}' offers {}x{} {:?} at {} fps",
            name, format.width, format.height, format.encoding, format.frame_rate
        );
        Ok(Self { id, name, format })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Formats offered by the stream. There is always exactly one.
    pub fn formats(&self) -> &[FormatDescriptor] {
        std::slice::from_ref(&self.format)
    }

    pub fn properties(&self, requested: &[StreamProperty]) -> StreamProperties {
        let mut answer = StreamProperties::default();
        for property in requested {
            match property {
                StreamProperty::ActiveFormatIndex => answer.active_format_index = Some(0),
                StreamProperty::FrameDuration => answer.frame_duration = Some(self.format.frame_duration()),
            }
        }
        answer
    }

    /// Selects the active format. Only index 0 exists.
    pub fn set_active_format_index(&self, index: usize) -> Result<(), RegistrationError> {
        if index >= self.formats().len() {
            error!("Rejected active format index {} on stream '{}'", index, self.name);
            return Err(RegistrationError::InvalidFormatIndex(index));
        }
        Ok(())
    }
}

/// Checks a format can back a stream.
pub fn validate_format(format: &FormatDescriptor) -> Result<(), RegistrationError> {
    if format.width == 0 || format.height == 0 {
        return Err(RegistrationError::InvalidFormat(format!(
            "dimensions must be positive, got {}x{}",
            format.width, format.height
        )));
    }
    if format.frame_rate == 0 || format.frame_rate > MAX_FRAME_RATE {
        return Err(RegistrationError::InvalidFormat(format!(
            "frame rate must be between 1 and {}, got {}",
            MAX_FRAME_RATE, format.frame_rate
        )));
    }
    if i32::try_from(format.bytes_per_row()).is_err() {
        return Err(RegistrationError::InvalidFormat(format!(
            "width {} is too large",
            format.width
        )));
    }
    Ok(())
}
