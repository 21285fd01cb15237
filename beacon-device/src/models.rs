use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::types::Uuid;

/// The kinds of device the gateway knows how to simulate
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Thermometer,
    Hygrometer,
    Barometer,
    PowerMeter,
    GpsTracker,
}

#[derive(Debug, Error)]
#[error("unknown device type '{0}'")]
pub struct UnknownDeviceTypeError(String);

impl DeviceType {
    pub const ALL: [DeviceType; 5] = [
        DeviceType::Thermometer,
        DeviceType::Hygrometer,
        DeviceType::Barometer,
        DeviceType::PowerMeter,
        DeviceType::GpsTracker,
    ];

    /// The identifier used for this type on the command line, in seed files
    /// and by the cloud
    pub fn slug(&self) -> &'static str {
        match self {
            DeviceType::Thermometer => "thermometer",
            DeviceType::Hygrometer => "hygrometer",
            DeviceType::Barometer => "barometer",
            DeviceType::PowerMeter => "power-meter",
            DeviceType::GpsTracker => "gps-tracker",
        }
    }
}

impl Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for DeviceType {
    type Err = UnknownDeviceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let slug = s.trim().to_ascii_lowercase().replace('_', "-");
        DeviceType::ALL
            .into_iter()
            .find(|t| t.slug() == slug)
            .ok_or_else(|| UnknownDeviceTypeError(s.to_owned()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub uuid: Uuid,
    pub name: String,
    pub device_type: DeviceType,

    /// Whether this is the device currently reporting telemetry
    pub active: bool,
}

/// Input to create a device
#[derive(Deserialize, Debug, Clone)]
pub struct NewDevice {
    /// Generated if not given
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub name: String,
    pub device_type: DeviceType,
    #[serde(default)]
    pub active: bool,
}

/// Changes to an existing device, `None` fields are left untouched
#[derive(Deserialize, Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub device_type: Option<DeviceType>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slugs_round_trip_through_from_str_and_serde() {
        for device_type in DeviceType::ALL {
            assert_eq!(device_type.slug().parse::<DeviceType>().unwrap(), device_type);
            assert_eq!(
                serde_json::to_value(device_type).unwrap(),
                json!(device_type.slug())
            );
        }
    }

    #[test]
    fn parsing_is_lenient_on_case_and_separator() {
        assert_eq!(
            "Power_Meter".parse::<DeviceType>().unwrap(),
            DeviceType::PowerMeter
        );
        assert_eq!(
            " THERMOMETER ".parse::<DeviceType>().unwrap(),
            DeviceType::Thermometer
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = "toaster".parse::<DeviceType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown device type 'toaster'");
        assert!(serde_json::from_value::<DeviceType>(json!("toaster")).is_err());
    }

    #[test]
    fn new_device_defaults() {
        let device: NewDevice = serde_json::from_value(json!({
            "name": "kitchen",
            "device_type": "hygrometer"
        }))
        .unwrap();

        assert!(device.uuid.is_none());
        assert!(!device.active);
        assert_eq!(device.device_type, DeviceType::Hygrometer);
    }
}
