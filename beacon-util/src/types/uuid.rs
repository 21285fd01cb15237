use std::fmt::Display;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a device or a message
///
/// Any non-empty string of ASCII letters, digits, `-` and `_` is accepted,
/// as identifiers end up in request paths and file names. New identifiers
/// are random v4 UUIDs in their simple (no hyphens) form.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(String);

#[derive(Debug, Error)]
#[error("invalid identifier '{0}': expected ASCII letters, digits, '-' or '_'")]
pub struct InvalidUuidError(String);

impl Uuid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for Uuid {
    fn default() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl Deref for Uuid {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Uuid {
    type Err = InvalidUuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(InvalidUuidError(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for Uuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Uuid> for String {
    fn from(value: Uuid) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_uuids_are_valid_and_distinct() {
        let a = Uuid::new();
        let b = Uuid::new();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.parse::<Uuid>().is_ok());
    }

    #[test]
    fn it_rejects_path_like_identifiers() {
        assert!("".parse::<Uuid>().is_err());
        assert!("../etc".parse::<Uuid>().is_err());
        assert!("a b".parse::<Uuid>().is_err());
        assert!("sensor-01_a".parse::<Uuid>().is_ok());
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<Uuid>(r#""dev-1""#).is_ok());
        assert!(serde_json::from_str::<Uuid>(r#""dev/1""#).is_err());
    }
}
