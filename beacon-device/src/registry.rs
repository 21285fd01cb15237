use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Device, DeviceUpdate, NewDevice};
use crate::util::types::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device {0} not found")]
    NotFound(Uuid),

    #[error("device {0} already exists")]
    AlreadyExists(Uuid),

    #[error("device name cannot be empty")]
    InvalidName,
}

#[derive(Default)]
struct Inner {
    devices: HashMap<Uuid, Device>,
    current: Option<Uuid>,
}

impl Inner {
    // The `active` flag is derived from `current` on the way out, so the
    // stored copies never disagree about which device is active.
    fn view(&self, device: &Device) -> Device {
        Device {
            active: self.current.as_ref() == Some(&device.uuid),
            ..device.clone()
        }
    }
}

/// In-memory device registry
///
/// Clones share the same devices. At most one device is active at any time.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<Inner>>,
}

fn validate_name(name: &str) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::InvalidName);
    }
    Ok(name.to_owned())
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave `Inner` half-updated, every
    // mutation below is a single insert/remove/assignment.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, new: NewDevice) -> Result<Device, RegistryError> {
        let name = validate_name(&new.name)?;
        let uuid = new.uuid.unwrap_or_default();

        let mut inner = self.write();
        if inner.devices.contains_key(&uuid) {
            return Err(RegistryError::AlreadyExists(uuid));
        }

        let device = Device {
            uuid: uuid.clone(),
            name,
            device_type: new.device_type,
            active: false,
        };
        inner.devices.insert(uuid.clone(), device.clone());
        debug!(device = %uuid, device_type = %device.device_type, "device created");

        if new.active {
            inner.current = Some(uuid);
            info!(device = %device.uuid, "device activated");
        }

        Ok(inner.view(&device))
    }

    pub fn get(&self, uuid: &Uuid) -> Option<Device> {
        let inner = self.read();
        inner.devices.get(uuid).map(|d| inner.view(d))
    }

    /// All devices ordered by name
    pub fn list(&self) -> Vec<Device> {
        let inner = self.read();
        let mut devices: Vec<Device> = inner.devices.values().map(|d| inner.view(d)).collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uuid.cmp(&b.uuid)));
        devices
    }

    pub fn update(&self, uuid: &Uuid, update: DeviceUpdate) -> Result<Device, RegistryError> {
        let name = update.name.as_deref().map(validate_name).transpose()?;

        let mut inner = self.write();
        let device = inner
            .devices
            .get_mut(uuid)
            .ok_or_else(|| RegistryError::NotFound(uuid.clone()))?;

        if let Some(name) = name {
            device.name = name;
        }
        if let Some(device_type) = update.device_type {
            device.device_type = device_type;
        }
        let device = device.clone();
        debug!(device = %uuid, "device updated");

        Ok(inner.view(&device))
    }

    /// Remove a device, if it was the active one no device is active after
    pub fn delete(&self, uuid: &Uuid) -> Result<Device, RegistryError> {
        let mut inner = self.write();
        let device = inner
            .devices
            .remove(uuid)
            .ok_or_else(|| RegistryError::NotFound(uuid.clone()))?;

        let was_active = inner.current.as_ref() == Some(uuid);
        if was_active {
            inner.current = None;
            info!(device = %uuid, "active device removed");
        }
        debug!(device = %uuid, "device deleted");

        Ok(Device {
            active: was_active,
            ..device
        })
    }

    /// Make `uuid` the active device, deactivating any other
    pub fn activate(&self, uuid: &Uuid) -> Result<Device, RegistryError> {
        let mut inner = self.write();
        let device = inner
            .devices
            .get(uuid)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(uuid.clone()))?;

        if let Some(previous) = inner.current.replace(uuid.clone())
            && &previous != uuid
        {
            debug!(device = %previous, "device deactivated");
        }
        info!(device = %uuid, "device activated");

        Ok(inner.view(&device))
    }

    /// Leave no device active, returns the previously active one
    pub fn deactivate(&self) -> Option<Device> {
        let mut inner = self.write();
        let previous = inner.current.take()?;
        info!(device = %previous, "device deactivated");
        inner.devices.get(&previous).map(|d| Device {
            active: false,
            ..d.clone()
        })
    }

    /// The active device, if any
    pub fn current(&self) -> Option<Device> {
        let inner = self.read();
        inner
            .current
            .as_ref()
            .and_then(|uuid| inner.devices.get(uuid))
            .map(|d| inner.view(d))
    }
}
