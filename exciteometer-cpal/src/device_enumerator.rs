//! Input device enumeration via the cpal default host.

use cpal::traits::{DeviceTrait, HostTrait};

use exciteometer_core::models::error::CaptureError;

/// An input endpoint as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Native rate and channel count, if the device reports a default config.
    pub default_sample_rate: Option<u32>,
    pub default_channels: Option<u16>,
}

/// List active capture (microphone) devices on the default host.
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, CaptureError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to enumerate input devices: {}", e)))?;

    let mut found = Vec::new();
    for (i, device) in devices.enumerate() {
        let name = device.name().unwrap_or_else(|_| format!("Device {}", i));
        let config = device.default_input_config().ok();
        found.push(InputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            default_sample_rate: config.as_ref().map(|c| c.sample_rate().0),
            default_channels: config.as_ref().map(|c| c.channels()),
            name,
        });
    }
    Ok(found)
}

/// Resolve a device by exact name, or the host default when `name` is `None`.
pub(crate) fn find_input_device(name: Option<&str>) -> Result<cpal::Device, CaptureError> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| CaptureError::DeviceUnavailable(format!("failed to enumerate input devices: {}", e)))?;
            devices
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable(format!("input device '{}' not found", wanted)))
        }
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into())),
    }
}
