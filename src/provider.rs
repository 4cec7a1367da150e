//! Provider: the top-level object a host talks to. Owns the device.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bridge::NotificationCenter;
use crate::config::CameraConfig;
use crate::device::{ClientInfo, Device, ProviderProperties, ProviderProperty};
use crate::error::RegistrationError;
use crate::output::OutputBackend;

pub struct Provider {
    manufacturer: String,
    device: Device,
    center: NotificationCenter,
    clients: Mutex<HashMap<u64, ClientInfo>>,
}

impl Provider {
    /// Creates the device and subscribes it to `center`.
    pub fn new(
        config: &CameraConfig,
        output: Box<dyn OutputBackend>,
        center: NotificationCenter,
    ) -> Result<Self, RegistrationError> {
        let device = Device::new(config, output)?;
        device.register_notifications(&center);
        info!("Provider ready with device '{}'", device.name());

        Ok(Self {
            manufacturer: config.device.manufacturer.clone(),
            device,
            center,
            clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn notification_center(&self) -> &NotificationCenter {
        &self.center
    }

    pub fn properties(&self, requested: &[ProviderProperty]) -> ProviderProperties {
        let mut answer = ProviderProperties::default();
        for property in requested {
            match property {
                ProviderProperty::Manufacturer => answer.manufacturer = Some(self.manufacturer.clone()),
            }
        }
        answer
    }

    /// Records a client connection. Clients are always accepted.
    pub fn connect(&self, client: ClientInfo) -> bool {
        info!(
            "Client {} connected ({})",
            client.id,
            client.process_name.as_deref().unwrap_or("unknown process")
        );
        self.clients.lock().insert(client.id, client);
        true
    }

    pub fn disconnect(&self, client_id: u64) {
        match self.clients.lock().remove(&client_id) {
            Some(_) => info!("Client {} disconnected", client_id),
            None => warn!("Disconnect from unknown client {}", client_id),
        }
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::frame::Frame;
    use crate::output::OutputMode;

    struct Discard;

    impl OutputBackend for Discard {
        fn deliver(&mut self, _frame: Frame) -> Result<(), DeliveryError> {
            Ok(())
        }

        fn mode(&self) -> OutputMode {
            OutputMode::Sink
        }
    }

    fn provider() -> Provider {
        let mut config = CameraConfig::default();
        config.stream.width = 2;
        config.stream.height = 2;
        Provider::new(&config, Box::new(Discard), NotificationCenter::new()).unwrap()
    }

    #[test]
    fn test_manufacturer_property() {
        let provider = provider();
        assert_eq!(
            provider.properties(&[ProviderProperty::Manufacturer]).manufacturer.as_deref(),
            Some("OffcutsCam Manufacturer")
        );
        assert_eq!(provider.properties(&[]), ProviderProperties::default());
    }

    #[test]
    fn test_clients_connect_and_disconnect() {
        let provider = provider();
        assert!(provider.connect(ClientInfo::new(7).with_process_name("viewer")));
        assert!(provider.connect(ClientInfo::new(8)));
        assert_eq!(provider.connected_clients(), 2);

        provider.disconnect(7);
        provider.disconnect(7);
        assert_eq!(provider.connected_clients(), 1);
    }

    #[test]
    fn test_device_is_subscribed() {
        let provider = provider();
        assert_eq!(provider.notification_center().observer_count(), 1);
        provider.notification_center().post_named("change active image");
        assert_eq!(provider.device().image_state(), crate::assets::ImageState::Obstructed);
    }
}
