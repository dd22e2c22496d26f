//! Input device enumeration for operator device pickers.

use cpal::traits::{DeviceTrait, HostTrait};

use audio_relay_core::models::error::RelayError;

/// Names of the capture devices on the default host, default first when
/// one is configured.
pub fn input_device_names() -> Result<Vec<String>, RelayError> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok());

    let mut names: Vec<String> = host
        .input_devices()
        .map_err(|e| RelayError::ConfigurationFailed(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect();

    if let Some(default_name) = default_name {
        if let Some(index) = names.iter().position(|n| *n == default_name) {
            names.swap(0, index);
        }
    }
    Ok(names)
}
