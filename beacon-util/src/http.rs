use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid URI: {0}")]
pub struct InvalidUriError(String);

impl From<http::uri::InvalidUri> for InvalidUriError {
    fn from(value: http::uri::InvalidUri) -> Self {
        InvalidUriError(value.to_string())
    }
}

impl From<http::uri::InvalidUriParts> for InvalidUriError {
    fn from(value: http::uri::InvalidUriParts) -> Self {
        InvalidUriError(value.to_string())
    }
}

/// An absolute URI of a remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri(http::Uri);

impl Uri {
    pub fn from_static(src: &'static str) -> Self {
        Self(http::Uri::from_static(src))
    }

    /// Build a new URI by appending `path` to the path of this one.
    ///
    /// Any path prefix of the base is kept, so a base of
    /// `https://cloud.example.com/iot` joined with `/v1/devices` yields
    /// `https://cloud.example.com/iot/v1/devices`. Query strings on the
    /// base are dropped.
    pub fn join(&self, path: &str) -> Result<Self, InvalidUriError> {
        let base = self.0.path().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let path_and_query = http::uri::PathAndQuery::from_maybe_shared(format!("{base}/{path}"))?;

        let mut parts = self.0.clone().into_parts();
        parts.path_and_query = Some(path_and_query);
        Ok(Self(http::Uri::from_parts(parts)?))
    }
}

impl Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Uri {
    type Err = InvalidUriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri = http::Uri::from_str(s)?;
        // relative references cannot be used to reach a remote
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(InvalidUriError(format!("{s} is not an absolute URI")));
        }
        Ok(Self(uri))
    }
}

impl Serialize for Uri {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Uri {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keeps_the_base_path_prefix() {
        let base: Uri = "https://cloud.example.com/iot/".parse().unwrap();
        let uri = base.join("/v1/devices/activate").unwrap();
        assert_eq!(
            uri.to_string(),
            "https://cloud.example.com/iot/v1/devices/activate"
        );
    }

    #[test]
    fn join_on_a_bare_host() {
        let base: Uri = "http://127.0.0.1:1234".parse().unwrap();
        let uri = base.join("v1/devices/abc/messages").unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:1234/v1/devices/abc/messages");
    }

    #[test]
    fn relative_uris_are_rejected() {
        assert!("/v1/devices".parse::<Uri>().is_err());
        assert!("not a uri".parse::<Uri>().is_err());
    }

    #[test]
    fn it_serializes_as_a_string() {
        let uri: Uri = "https://cloud.example.com/".parse().unwrap();
        let value = serde_json::to_value(&uri).unwrap();
        assert_eq!(value, serde_json::json!("https://cloud.example.com/"));
        let back: Uri = serde_json::from_value(value).unwrap();
        assert_eq!(back, uri);
    }
}
