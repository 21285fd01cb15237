use std::collections::HashMap;

use thiserror::Error;
use tracing::{Span, debug, error, field, info, instrument, trace};

use crate::cloud::{ActivationError, Cloud, CloudError, DeliveryStatus, KeyCache, MessageReceipt};
use crate::device::{Device, DeviceRegistry, Sampler};
use crate::util::types::Uuid;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error("failed to send message: {0}")]
    Send(#[source] CloudError),

    #[error("failed to query message status: {0}")]
    Status(#[source] CloudError),

    #[error("message {0} was rejected: {1}")]
    Rejected(Uuid, String),

    #[error("message {message} still pending after {waited} checks")]
    Undelivered { message: Uuid, waited: u32 },
}

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// Number of status checks a message may stay pending before sending
    /// is disabled
    pub max_wait: u32,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { max_wait: 5 }
    }
}

/// The last message handed over to the cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outstanding {
    pub receipt: MessageReceipt,
    pub status: DeliveryStatus,
    /// Number of checks that found the message still pending
    pub waited: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Sending is disabled, nothing was done
    Disabled,
    /// There is no active device
    Idle,
    /// A new message was sent
    Sent(MessageReceipt),
    /// The previous message is still pending, with the number of checks so
    /// far
    Waiting(u32),
    /// The step failed and sending was disabled
    Failed,
}

/// Sends telemetry for the active device, one message at a time
///
/// A new message is only sent once the previous one was delivered. Any
/// failure disables sending until [`MessagingService::enable`] is called.
pub struct MessagingService<C> {
    cloud: C,
    keys: KeyCache,
    sampler: Sampler,
    config: MessagingConfig,
    sending_enabled: bool,
    outstanding: Option<Outstanding>,
    sequences: HashMap<Uuid, u64>,
}

impl<C: Cloud> MessagingService<C> {
    pub fn new(cloud: C, keys: KeyCache, config: MessagingConfig) -> Self {
        Self {
            cloud,
            keys,
            sampler: Sampler::new(),
            config,
            sending_enabled: true,
            outstanding: None,
            sequences: HashMap::new(),
        }
    }

    /// Use the given sampler for message readings
    pub fn with_sampler(self, sampler: Sampler) -> Self {
        Self { sampler, ..self }
    }

    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    /// Re-enable sending, forgetting about any outstanding message
    pub fn enable(&mut self) {
        self.outstanding = None;
        self.sending_enabled = true;
    }

    pub fn disable(&mut self) {
        self.sending_enabled = false;
    }

    pub fn is_sending_enabled(&self) -> bool {
        self.sending_enabled
    }

    pub fn outstanding(&self) -> Option<&Outstanding> {
        self.outstanding.as_ref()
    }

    /// Record a delivery status reported by the cloud for the outstanding
    /// message
    ///
    /// Statuses for any other message are ignored.
    pub fn record_status(&mut self, receipt: &MessageReceipt, status: DeliveryStatus) {
        match self.outstanding.as_mut() {
            Some(outstanding) if &outstanding.receipt == receipt => {
                debug!(id = %receipt.message, ?status, "status recorded");
                outstanding.status = status;
            }
            _ => trace!(id = %receipt.message, "ignoring status for unknown message"),
        }
    }

    /// Perform one delivery step for the current device of `registry`
    #[instrument(skip_all, fields(device = field::Empty))]
    pub async fn tick(&mut self, registry: &DeviceRegistry) -> TickOutcome {
        if !self.sending_enabled {
            trace!("sending disabled");
            return TickOutcome::Disabled;
        }

        let Some(device) = registry.current() else {
            trace!("no active device");
            return TickOutcome::Idle;
        };
        Span::current().record("device", field::display(&device.uuid));

        match self.try_tick(&device).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("{err}, disabling sending");
                self.disable();
                TickOutcome::Failed
            }
        }
    }

    async fn try_tick(&mut self, device: &Device) -> Result<TickOutcome, MessagingError> {
        let key = crate::cloud::activate(&mut self.cloud, &mut self.keys, device).await?;

        if let Some(dropped) = self
            .outstanding
            .take_if(|outstanding| outstanding.receipt.device != device.uuid)
        {
            debug!(id = %dropped.receipt.message, "dropping message of previous device");
        }

        if let Some(mut outstanding) = self.outstanding.take() {
            if outstanding.status == DeliveryStatus::Pending {
                match self.cloud.status(&key, &outstanding.receipt).await {
                    Ok(status) => outstanding.status = status,
                    Err(err) => {
                        self.outstanding = Some(outstanding);
                        return Err(MessagingError::Status(err));
                    }
                }
            }

            match outstanding.status {
                DeliveryStatus::Delivered => {
                    debug!(id = %outstanding.receipt.message, "message delivered");
                }
                DeliveryStatus::Pending => {
                    outstanding.waited += 1;
                    let waited = outstanding.waited;
                    if waited >= self.config.max_wait {
                        return Err(MessagingError::Undelivered {
                            message: outstanding.receipt.message,
                            waited,
                        });
                    }
                    debug!(id = %outstanding.receipt.message, waited, "message pending");
                    self.outstanding = Some(outstanding);
                    return Ok(TickOutcome::Waiting(waited));
                }
                DeliveryStatus::Rejected { reason } => {
                    return Err(MessagingError::Rejected(
                        outstanding.receipt.message,
                        reason.unwrap_or_else(|| "no reason given".to_owned()),
                    ));
                }
            }
        }

        let sequence = self.sequences.get(&device.uuid).copied().unwrap_or_default() + 1;
        let message = self.sampler.message(device, sequence);
        let receipt = self
            .cloud
            .send(&key, &message)
            .await
            .map_err(MessagingError::Send)?;
        self.sequences.insert(device.uuid.clone(), sequence);

        info!(id = %receipt.message, sequence, "message sent");
        self.outstanding = Some(Outstanding {
            receipt: receipt.clone(),
            status: DeliveryStatus::Pending,
            waited: 0,
        });
        Ok(TickOutcome::Sent(receipt))
    }
}
