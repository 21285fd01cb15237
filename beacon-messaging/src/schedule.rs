use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::cloud::Cloud;
use crate::device::DeviceRegistry;
use crate::service::{MessagingService, TickOutcome};
use crate::util::interrupt::Interrupt;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Time to wait before the first tick
    pub initial_delay: Duration,
    /// Time between the end of a tick and the start of the next one
    pub interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(10),
        }
    }
}

/// Run `service` on a fixed delay until `interrupt` is triggered
///
/// Ticks never overlap, the delay starts counting when the previous tick
/// completes. A tick in progress when the interrupt triggers is abandoned.
/// The service is returned to the caller on exit.
#[instrument(name = "schedule", skip_all)]
pub async fn start_schedule<C: Cloud>(
    mut service: MessagingService<C>,
    registry: DeviceRegistry,
    config: ScheduleConfig,
    interrupt: Interrupt,
) -> MessagingService<C> {
    info!(
        initial_delay = ?config.initial_delay,
        interval = ?config.interval,
        "schedule started"
    );

    let mut next_tick = Instant::now() + config.initial_delay;
    loop {
        tokio::select! {
            biased;

            _ = interrupt.wait() => break,

            _ = tokio::time::sleep_until(next_tick) => {
                let outcome = tokio::select! {
                    biased;

                    _ = interrupt.wait() => break,
                    outcome = service.tick(&registry) => outcome,
                };
                if !matches!(outcome, TickOutcome::Disabled | TickOutcome::Idle) {
                    debug!(?outcome, "tick complete");
                }

                next_tick = Instant::now() + config.interval;
            }
        }
    }

    info!("schedule stopped");
    service
}
