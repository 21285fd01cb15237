use std::fmt::{self, Debug, Display};
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::crypto::{ALPHA_NUM, pseudorandom_string};

/// A bearer credential, either a provisioning key or a device key
///
/// The `Debug` output is redacted so keys never end up in logs.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl Deref for ApiKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for ApiKey {
    fn default() -> Self {
        Self(pseudorandom_string(ALPHA_NUM, 32))
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<String> for ApiKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ApiKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
