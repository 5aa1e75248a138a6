//! Device enumeration for one cpal host.
//!
//! Devices are addressed by their index in the host's input or output
//! device list, which is also how the config store overrides select them.

use cpal::traits::{DeviceTrait, HostTrait};

use audio_device_core::models::error::BackendError;
use audio_device_core::models::format::Direction;

/// Lists and resolves devices of a cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new(host_id: cpal::HostId) -> Result<Self, BackendError> {
        let host = cpal::host_from_id(host_id)
            .map_err(|e| BackendError::DeviceUnavailable(format!("{:?}: {}", host_id, e)))?;
        Ok(Self { host })
    }

    pub fn host_name(&self) -> &'static str {
        self.host.id().name()
    }

    /// Names of all devices for `direction`, in index order.
    ///
    /// Devices whose name cannot be read are listed as `"<unnamed N>"` so
    /// indices stay aligned with the host's own order.
    pub fn device_names(&self, direction: Direction) -> Result<Vec<String>, BackendError> {
        Ok(self
            .devices(direction)?
            .iter()
            .enumerate()
            .map(|(i, device)| device.name().unwrap_or_else(|_| format!("<unnamed {}>", i)))
            .collect())
    }

    /// Device at `index` of the `direction` list.
    pub fn device(&self, direction: Direction, index: usize) -> Result<cpal::Device, BackendError> {
        self.devices(direction)?
            .into_iter()
            .nth(index)
            .ok_or_else(|| BackendError::DeviceUnavailable(format!("no {} device {}", direction, index)))
    }

    /// Index of the host's default device for `direction`.
    pub fn default_index(&self, direction: Direction) -> Option<usize> {
        let default = match direction {
            Direction::Playback => self.host.default_output_device(),
            Direction::Capture => self.host.default_input_device(),
        }?;
        let default_name = default.name().ok()?;
        let names = self.device_names(direction).ok()?;
        names.iter().position(|name| *name == default_name)
    }

    fn devices(&self, direction: Direction) -> Result<Vec<cpal::Device>, BackendError> {
        let devices: Vec<cpal::Device> = match direction {
            Direction::Playback => self
                .host
                .output_devices()
                .map_err(|e| BackendError::Io(format!("failed to list output devices: {}", e)))?
                .collect(),
            Direction::Capture => self
                .host
                .input_devices()
                .map_err(|e| BackendError::Io(format!("failed to list input devices: {}", e)))?
                .collect(),
        };
        log::debug!("{}: {} {} devices", self.host_name(), devices.len(), direction);
        Ok(devices)
    }
}
