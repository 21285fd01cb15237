use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::models::{Device, DeviceType};
use crate::util::types::Uuid;

/// A telemetry message as sent to the cloud
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub device: Uuid,
    pub device_type: DeviceType,
    /// Per device counter, starts at 1
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub readings: BTreeMap<String, f64>,
}

/// Source of simulated sensor readings
pub struct Sampler {
    rng: StdRng,
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

// rounded to two decimals, which is what real sensors of this kind report
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// A sampler producing the same readings for the same seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self, range: RangeInclusive<f64>) -> f64 {
        round2(self.rng.random_range(range))
    }

    pub fn readings(&mut self, device_type: DeviceType) -> BTreeMap<String, f64> {
        let readings = match device_type {
            DeviceType::Thermometer => vec![("temperature", self.sample(-20.0..=45.0))],
            DeviceType::Hygrometer => vec![
                ("humidity", self.sample(0.0..=100.0)),
                ("temperature", self.sample(-10.0..=40.0)),
            ],
            DeviceType::Barometer => vec![("pressure", self.sample(950.0..=1050.0))],
            DeviceType::PowerMeter => {
                let voltage = self.sample(220.0..=240.0);
                let current = self.sample(0.0..=16.0);
                vec![
                    ("voltage", voltage),
                    ("current", current),
                    ("power", round2(voltage * current)),
                ]
            }
            DeviceType::GpsTracker => vec![
                ("latitude", self.sample(-90.0..=90.0)),
                ("longitude", self.sample(-180.0..=180.0)),
                ("speed", self.sample(0.0..=120.0)),
            ],
        };

        readings
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value))
            .collect()
    }

    /// Build the next message for `device`
    pub fn message(&mut self, device: &Device, sequence: u64) -> Message {
        Message {
            id: Uuid::new(),
            device: device.uuid.clone(),
            device_type: device.device_type,
            sequence,
            timestamp: Utc::now(),
            readings: self.readings(device.device_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_within_range() {
        let mut sampler = Sampler::seeded(42);
        for _ in 0..100 {
            let r = sampler.readings(DeviceType::Hygrometer);
            assert!((0.0..=100.0).contains(&r["humidity"]));
            assert!((-10.0..=40.0).contains(&r["temperature"]));

            let r = sampler.readings(DeviceType::GpsTracker);
            assert!((-90.0..=90.0).contains(&r["latitude"]));
            assert!((-180.0..=180.0).contains(&r["longitude"]));
        }
    }

    #[test]
    fn power_is_derived_from_voltage_and_current() {
        let mut sampler = Sampler::seeded(7);
        let r = sampler.readings(DeviceType::PowerMeter);
        assert_eq!(r["power"], round2(r["voltage"] * r["current"]));
    }

    #[test]
    fn seeded_samplers_are_deterministic() {
        let a = Sampler::seeded(1).readings(DeviceType::Barometer);
        let b = Sampler::seeded(1).readings(DeviceType::Barometer);
        assert_eq!(a, b);
    }

    #[test]
    fn messages_carry_the_device_identity() {
        let device = Device {
            uuid: "kitchen-01".parse().unwrap(),
            name: "kitchen".into(),
            device_type: DeviceType::Thermometer,
            active: true,
        };

        let message = Sampler::seeded(3).message(&device, 12);
        assert_eq!(message.device, device.uuid);
        assert_eq!(message.device_type, DeviceType::Thermometer);
        assert_eq!(message.sequence, 12);
        assert_eq!(message.readings.len(), 1);
        assert!(message.readings.contains_key("temperature"));
    }
}
