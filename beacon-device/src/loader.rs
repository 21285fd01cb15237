use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument};

use crate::models::{Device, NewDevice};
use crate::registry::{DeviceRegistry, RegistryError};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, #[source] io::Error),

    #[error("failed to parse {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
}

/// Read the device seeds from a JSON file
///
/// The file holds an array of devices, e.g.
/// ```json
/// [
///   { "uuid": "kitchen-01", "name": "kitchen", "device_type": "thermometer", "active": true },
///   { "name": "garage", "device_type": "power-meter" }
/// ]
/// ```
#[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
pub async fn load_devices<P: AsRef<Path>>(path: P) -> Result<Vec<NewDevice>, LoadError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| LoadError::Read(path.to_path_buf(), e))?;
    let devices: Vec<NewDevice> =
        serde_json::from_str(&contents).map_err(|e| LoadError::Parse(path.to_path_buf(), e))?;
    debug!("found {} devices", devices.len());
    Ok(devices)
}

/// Insert the devices into the registry in order
///
/// When several seeds are marked active the last one stays active.
pub fn seed(
    registry: &DeviceRegistry,
    devices: Vec<NewDevice>,
) -> Result<Vec<Device>, RegistryError> {
    devices
        .into_iter()
        .map(|device| registry.create(device))
        .collect()
}
