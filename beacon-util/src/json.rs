//! Serde helpers for the JSON documents kept by the gateway

/// (De)serialize a [`Duration`](std::time::Duration) as a whole number of
/// milliseconds, for use with `#[serde(with = "duration_ms")]`
///
/// Durations too long for a `u64` of milliseconds are written as
/// `u64::MAX`.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
