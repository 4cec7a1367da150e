//! Property queries answered by the provider, device and stream.
//!
//! Queries name the properties they want. Only those are filled in the
//! answer; everything else stays `None`.

use crate::frame::MediaTime;

/// How the device is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Virtual,
}

impl TransportType {
    /// Four-character transport code, as hosts report it.
    pub fn code(&self) -> u32 {
        match self {
            TransportType::Virtual => u32::from_be_bytes(*b"virt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderProperty {
    Manufacturer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceProperty {
    TransportType,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamProperty {
    ActiveFormatIndex,
    FrameDuration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProperties {
    pub manufacturer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProperties {
    pub transport_type: Option<TransportType>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamProperties {
    pub active_format_index: Option<usize>,
    pub frame_duration: Option<MediaTime>,
}

/// A host process connecting to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientInfo {
    pub id: u64,
    pub process_name: Option<String>,
}

impl ClientInfo {
    pub fn new(id: u64) -> Self {
        Self { id, process_name: None }
    }

    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }
}
