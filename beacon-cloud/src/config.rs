use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::config::StoredConfig;
use crate::util::http::Uri;
use crate::util::json::duration_ms;
use crate::util::types::ApiKey;

// Be careful changing CloudConfig and RequestConfig. They are persisted to
// disk, a config that no longer deserializes makes the gateway refuse to
// start until the cloud arguments are passed again.

/// Cloud backend configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CloudConfig {
    pub api_endpoint: Uri,

    /// Credential used to activate new devices
    pub provisioning_key: ApiKey,

    #[serde(default)]
    pub request: RequestConfig,
}

impl StoredConfig for CloudConfig {
    fn kind() -> &'static str {
        "cloud"
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RequestConfig {
    /// Maximum time to wait for a single HTTP request to complete.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// Minimum time between consecutive requests, also the initial backoff.
    #[serde(with = "duration_ms")]
    pub min_interval: Duration,

    /// Upper bound of the exponential backoff.
    #[serde(with = "duration_ms")]
    pub max_backoff: Duration,

    /// Retries of a failing request before giving up.
    pub max_retries: u32,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            min_interval: Duration::from_millis(1_000),
            max_backoff: Duration::from_millis(60_000),
            max_retries: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn durations_are_stored_as_milliseconds() {
        let value = serde_json::to_value(RequestConfig::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "timeout": 30000,
                "min_interval": 1000,
                "max_backoff": 60000,
                "max_retries": 5
            })
        );
    }

    #[test]
    fn request_defaults_apply_when_missing() {
        let config: CloudConfig = serde_json::from_value(json!({
            "api_endpoint": "https://cloud.example.com",
            "provisioning_key": "abc"
        }))
        .unwrap();

        assert_eq!(config.request, RequestConfig::default());
        assert_eq!(&*config.provisioning_key, "abc");
    }
}
