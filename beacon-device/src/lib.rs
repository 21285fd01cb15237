//! Devices managed by the gateway.
//!
//! The registry only lives in memory, it is seeded from a JSON file on
//! start and at most one of its devices is active (reporting) at a time.

mod loader;
mod models;
mod registry;
mod telemetry;

pub use loader::{LoadError, load_devices, seed};
pub use models::{Device, DeviceType, DeviceUpdate, NewDevice, UnknownDeviceTypeError};
pub use registry::{DeviceRegistry, RegistryError};
pub use telemetry::{Message, Sampler};

use beacon_util as util;
