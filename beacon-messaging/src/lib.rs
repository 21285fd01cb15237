//! Telemetry delivery for the active device.
//!
//! [`MessagingService::tick`] performs a single delivery step, and
//! [`start_schedule`] drives it with a fixed delay between steps until
//! interrupted.

mod schedule;
mod service;

pub use schedule::{ScheduleConfig, start_schedule};
pub use service::{MessagingConfig, MessagingError, MessagingService, Outstanding, TickOutcome};

use beacon_cloud as cloud;
use beacon_device as device;
use beacon_util as util;
