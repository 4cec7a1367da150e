//! The virtual camera device and its stream.

mod pipeline;
pub mod properties;
mod stream;
mod streaming;

pub use pipeline::{FramePipeline, PipelineStats};
pub use properties::{
    ClientInfo, DeviceProperties, DeviceProperty, ProviderProperties, ProviderProperty, StreamProperties,
    StreamProperty, TransportType,
};
pub use stream::{validate_format, Stream, MAX_FRAME_RATE};
pub use streaming::{Session, SessionFactory, StreamingPhase, StreamingStateMachine};

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::assets::ImageState;
use crate::bridge::{NotificationCenter, NotificationName, Subscription};
use crate::config::CameraConfig;
use crate::error::RegistrationError;
use crate::output::{OutputBackend, OutputMode};
use crate::pixel::{BufferPool, PixelBufferConverter};

/// State shared with notification handlers.
struct DeviceCore {
    state: Arc<Mutex<ImageState>>,
    streaming: StreamingStateMachine<FramePipeline>,
}

impl DeviceCore {
    fn toggle_image(&self) -> ImageState {
        let next = {
            let mut state = self.state.lock();
            *state = state.toggled();
            *state
        };
        info!("Active image is now {}", next);
        self.streaming.restart();
        next
    }
}

/// A virtual camera with a single stream.
///
/// Consumers call [`Device::start_stream`] and [`Device::stop_stream`]; the
/// first start launches the frame clock and the last stop cancels it.
pub struct Device {
    id: Uuid,
    name: String,
    model: String,
    stream: Stream,
    output_mode: OutputMode,
    core: Arc<DeviceCore>,
    subscription: Mutex<Option<Subscription>>,
}

impl Device {
    /// Creates the device and its stream. Frames go to `output`.
    pub fn new(config: &CameraConfig, output: Box<dyn OutputBackend>) -> Result<Self, RegistrationError> {
        let format = config.format();
        let stream = Stream::new(config.stream_id(), &config.stream.name, format)?;
        let pool = BufferPool::new(format, config.stream.pool_capacity)?;
        let output_mode = output.mode();

        let state = Arc::new(Mutex::new(config.initial_state));
        let pipeline = FramePipeline::new(
            config.asset_bundle(),
            PixelBufferConverter::new(format),
            pool,
            Arc::new(Mutex::new(output)),
            state.clone(),
        );

        let device = Self {
            id: config.device_id(),
            name: config.device.name.clone(),
            model: config.device.model.clone(),
            stream,
            output_mode,
            core: Arc::new(DeviceCore {
                state,
                streaming: StreamingStateMachine::new(pipeline),
            }),
            subscription: Mutex::new(None),
        };
        info!(
            "Device '{}' ({}) created, output mode {:?}, showing {} image",
            device.name, device.id, output_mode, config.initial_state
        );
        Ok(device)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    pub fn properties(&self, requested: &[DeviceProperty]) -> DeviceProperties {
        let mut answer = DeviceProperties::default();
        for property in requested {
            match property {
                DeviceProperty::TransportType => answer.transport_type = Some(TransportType::Virtual),
                DeviceProperty::Model => answer.model = Some(self.model.clone()),
            }
        }
        answer
    }

    /// Any client may start the stream.
    pub fn authorized_to_start_stream(&self, client: &ClientInfo) -> bool {
        debug!("Client {} asked to start streaming", client.id);
        true
    }

    /// Registers a consumer. Returns the number of active consumers.
    pub fn start_stream(&self) -> u32 {
        self.core.streaming.start()
    }

    /// Unregisters a consumer. Returns the number of active consumers.
    pub fn stop_stream(&self) -> u32 {
        self.core.streaming.stop()
    }

    pub fn image_state(&self) -> ImageState {
        *self.core.state.lock()
    }

    /// Flips the active image and restarts any running stream on it.
    pub fn toggle_image(&self) -> ImageState {
        self.core.toggle_image()
    }

    pub fn consumer_count(&self) -> u32 {
        self.core.streaming.counter()
    }

    /// True while the frame clock runs.
    pub fn is_streaming(&self) -> bool {
        self.core.streaming.is_running()
    }

    pub fn phase(&self) -> StreamingPhase {
        self.core.streaming.phase()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.core.streaming.factory().stats().clone()
    }

    /// Buffers currently held by frames in flight.
    pub fn buffers_in_flight(&self) -> usize {
        self.core.streaming.factory().pool().in_flight()
    }

    /// Subscribes the device to image change notifications on `center`.
    /// Registering again replaces the earlier registration.
    pub fn register_notifications(&self, center: &NotificationCenter) {
        let core: Weak<DeviceCore> = Arc::downgrade(&self.core);
        let subscription = center.add_observer(self.id, NotificationName::ChangeImage, move |name| {
            if let Some(core) = core.upgrade() {
                debug!("Handling '{}'", name);
                core.toggle_image();
            }
        });
        *self.subscription.lock() = Some(subscription);
    }

    pub fn unregister_notifications(&self) {
        if self.subscription.lock().take().is_some() {
            debug!("Device '{}' stopped observing notifications", self.name);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.unregister_notifications();
        if self.core.streaming.counter() > 0 {
            debug!("Device '{}' dropped while streaming, stopping clock", self.name);
        }
        while self.core.streaming.stop() > 0 {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::frame::Frame;

    struct Discard;

    impl OutputBackend for Discard {
        fn deliver(&mut self, _frame: Frame) -> Result<(), DeliveryError> {
            Ok(())
        }

        fn mode(&self) -> OutputMode {
            OutputMode::Sink
        }
    }

    fn device_without_assets() -> Device {
        let mut config = CameraConfig::default();
        config.assets.directory = "/nonexistent/offcuts-cam".into();
        config.stream.width = 4;
        config.stream.height = 4;
        Device::new(&config, Box::new(Discard)).unwrap()
    }

    #[test]
    fn test_device_properties() {
        let device = device_without_assets();
        let answer = device.properties(&[DeviceProperty::TransportType]);
        assert_eq!(answer.transport_type, Some(TransportType::Virtual));
        assert_eq!(answer.model, None);

        let answer = device.properties(&[DeviceProperty::Model]);
        assert_eq!(answer.model.as_deref(), Some("OffcutsCam Model"));
    }

    #[test]
    fn test_missing_asset_degrades_and_stop_still_works() {
        let device = device_without_assets();
        assert_eq!(device.start_stream(), 1);
        assert_eq!(device.phase(), StreamingPhase::Degraded);
        assert!(!device.is_streaming());

        assert_eq!(device.stop_stream(), 0);
        assert_eq!(device.phase(), StreamingPhase::Idle);
    }

    #[test]
    fn test_toggle_while_idle_only_flips_state() {
        let device = device_without_assets();
        assert_eq!(device.toggle_image(), ImageState::Obstructed);
        assert_eq!(device.consumer_count(), 0);
        assert_eq!(device.phase(), StreamingPhase::Idle);
        assert_eq!(device.toggle_image(), ImageState::Clear);
    }

    #[test]
    fn test_notification_toggles_until_unregistered() {
        let device = device_without_assets();
        let center = NotificationCenter::new();
        device.register_notifications(&center);
        device.register_notifications(&center);
        assert_eq!(center.observer_count(), 1);

        center.post_named("change active image");
        assert_eq!(device.image_state(), ImageState::Obstructed);

        device.unregister_notifications();
        center.post_named("change active image");
        assert_eq!(device.image_state(), ImageState::Obstructed);
        assert_eq!(center.observer_count(), 0);
    }

    #[test]
    fn test_any_client_is_authorized() {
        let device = device_without_assets();
        assert!(device.authorized_to_start_stream(&ClientInfo::new(1)));
    }
}
