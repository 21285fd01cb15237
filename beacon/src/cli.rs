use clap::Parser;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use crate::util::http::Uri;
use crate::util::types::{ApiKey, Uuid};

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Cloud API endpoint URI
    #[arg(
        env = "BEACON_CLOUD_API_ENDPOINT",
        long = "cloud-api-endpoint",
        value_name = "uri",
        requires = "provisioning_key"
    )]
    pub cloud_api_endpoint: Option<Uri>,

    /// Key used to activate devices with the cloud
    #[arg(
        env = "BEACON_PROVISIONING_KEY",
        long = "provisioning-key",
        value_name = "key",
        requires = "cloud_api_endpoint"
    )]
    pub provisioning_key: Option<ApiKey>,

    /// Cloud request timeout in milliseconds
    #[arg(
        env = "BEACON_REQUEST_TIMEOUT_MS",
        long = "request-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub request_timeout: Option<Duration>,

    /// Minimum time between cloud requests in milliseconds
    #[arg(
        env = "BEACON_REQUEST_MIN_INTERVAL_MS",
        long = "request-min-interval-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub request_min_interval: Option<Duration>,

    /// Maximum backoff between retries of a cloud request in milliseconds
    #[arg(
        env = "BEACON_REQUEST_MAX_BACKOFF_MS",
        long = "request-max-backoff-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub request_max_backoff: Option<Duration>,

    /// Retries of a failing cloud request before giving up
    #[arg(
        env = "BEACON_REQUEST_MAX_RETRIES",
        long = "request-max-retries",
        value_name = "int"
    )]
    pub request_max_retries: Option<u32>,

    /// JSON file with the devices to load on start
    #[arg(env = "BEACON_DEVICES", long = "devices", value_name = "path")]
    pub devices: Option<PathBuf>,

    /// Device to activate on start
    #[arg(env = "BEACON_DEVICE", long = "device", value_name = "uuid")]
    pub device: Option<Uuid>,

    /// Delay before the first message in milliseconds
    #[arg(
        env = "BEACON_INITIAL_DELAY_MS",
        long = "initial-delay-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub initial_delay: Option<Duration>,

    /// Delay between messages in milliseconds
    #[arg(
        env = "BEACON_INTERVAL_MS",
        long = "interval-ms",
        value_name = "ms",
        value_parser = parse_duration
    )]
    pub interval: Option<Duration>,

    /// Status checks a message may stay pending before sending is disabled
    #[arg(env = "BEACON_MAX_WAIT", long = "max-wait", value_name = "int")]
    pub max_wait: Option<u32>,
}

pub fn parse() -> Cli {
    Parser::parse()
}
