/*
This crate is home to everything related to the cloud backend that receives
telemetry from the gateway.

The backend is reached through the `Cloud` trait. `HttpCloud` is the bundled
implementation, talking JSON over HTTP with rate limiting and bounded
retries. Devices need to be activated before they can send messages, the
resulting device keys are cached on disk so activation happens once per
device and backend.
*/

mod activation;
mod client;
mod config;
mod request;

pub use activation::{ActivationError, KeyCache, activate};
pub use client::{
    ActivationRequest, Cloud, CloudError, DeliveryStatus, HttpCloud, MessageReceipt,
};
pub use config::{CloudConfig, RequestConfig};
pub use request::{Client, Reply, RequestError, RequestMetrics};

use beacon_device as device;
use beacon_util as util;
