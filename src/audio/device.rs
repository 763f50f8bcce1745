//! Input device enumeration and selection using cpal
//!
//! Microphones are identified by cpal's stable `DeviceId` string so a
//! configured input survives restarts. An unknown or missing id resolves to
//! the system default input.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::DeviceId;
use serde::Serialize;
use std::str::FromStr;

/// A microphone the meter can record from
#[derive(Debug, Clone, Serialize)]
pub struct InputDevice {
    /// Stable identifier, suitable for `audio.device_id` in the config
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Whether this is the system default input
    pub is_default: bool,
}

/// Display name of a device, preferring cpal's description over the legacy name
pub fn get_device_display_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|_| {
            #[allow(deprecated)]
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        })
}

/// List the input devices of the default host
pub fn list_input_devices() -> Vec<InputDevice> {
    let host = cpal::default_host();
    let default_id = host
        .default_input_device()
        .and_then(|d| d.id().ok())
        .map(|id| id.to_string());

    let devices: Vec<InputDevice> = match host.input_devices() {
        Ok(iter) => iter
            .filter_map(|device| {
                let id = device.id().ok()?.to_string();
                Some(InputDevice {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    name: get_device_display_name(&device),
                    id,
                })
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Could not enumerate input devices: {}", e);
            Vec::new()
        }
    };

    tracing::debug!(
        "Host '{}' exposes {} input device(s)",
        host.id().name(),
        devices.len()
    );
    devices
}

/// Resolve the input to record from.
///
/// Uses the configured device when it can be found, otherwise the system
/// default. Returns `None` when the host has no input at all.
pub fn get_recording_device(device_id: Option<&str>) -> Option<cpal::Device> {
    let host = cpal::default_host();

    if let Some(id) = device_id {
        let found = DeviceId::from_str(id)
            .ok()
            .and_then(|parsed| host.device_by_id(&parsed));
        match found {
            Some(device) => {
                tracing::info!(
                    "Using configured input '{}'",
                    get_device_display_name(&device)
                );
                return Some(device);
            }
            None => tracing::warn!(
                "Configured input '{}' not found, falling back to the default",
                id
            ),
        }
    }

    let device = host.default_input_device();
    match &device {
        Some(d) => tracing::info!("Using default input '{}'", get_device_display_name(d)),
        None => tracing::error!("No default input device available"),
    }
    device
}
