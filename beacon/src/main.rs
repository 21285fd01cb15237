use std::error::Error;

use thiserror::Error;
use tracing::{info, instrument, trace, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod cli;

use beacon_cloud as cloud;
use beacon_device as device;
use beacon_messaging as messaging;
use beacon_util as util;

use crate::cli::Cli;
use crate::cloud::{CloudConfig, HttpCloud, KeyCache, RequestConfig};
use crate::device::{DeviceRegistry, load_devices, seed};
use crate::messaging::{MessagingConfig, MessagingService, ScheduleConfig, start_schedule};
use crate::util::config;
use crate::util::dirs::config_dir;
use crate::util::interrupt::Interrupt;
use crate::util::store::{Store, StoreError};

fn initialize_tracing() {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            // Use some log defaults. These can be overriden using
            // RUST_LOG
            EnvFilter::try_from_default_env().unwrap_or(
                EnvFilter::default()
                    .add_directive("debug".parse().unwrap())
                    .add_directive("hyper=error".parse().unwrap())
                    .add_directive("reqwest=info".parse().unwrap()),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();
}

#[derive(Debug, Error)]
enum ConfigError {
    #[error("failed to read/write cloud config: {0}")]
    Store(#[from] StoreError),

    #[error("no cloud config found, use --cloud-api-endpoint and --provisioning-key")]
    Missing,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    initialize_tracing();

    let cli = cli::parse();

    // Create a new configuration store instance
    let config_store = Store::new(config_dir());

    let cloud_config = resolve_cloud_config(&cli, &config_store).await?;

    let registry = DeviceRegistry::new();
    if let Some(path) = &cli.devices {
        let devices = seed(&registry, load_devices(path).await?)?;
        info!("loaded {} devices from {}", devices.len(), path.display());
    }
    if let Some(uuid) = &cli.device {
        registry.activate(uuid)?;
    }
    if registry.current().is_none() {
        warn!("no active device, nothing will be sent");
    }

    start_gateway(&cli, cloud_config, registry, config_store).await
}

#[instrument(name = "beacon", skip_all, err)]
async fn start_gateway(
    cli: &Cli,
    cloud_config: CloudConfig,
    registry: DeviceRegistry,
    config_store: Store,
) -> Result<(), Box<dyn Error>> {
    let schedule_defaults = ScheduleConfig::default();
    let schedule_config = ScheduleConfig {
        initial_delay: cli
            .initial_delay
            .unwrap_or(schedule_defaults.initial_delay),
        interval: cli.interval.unwrap_or(schedule_defaults.interval),
    };
    let messaging_config = MessagingConfig {
        max_wait: cli
            .max_wait
            .unwrap_or(MessagingConfig::default().max_wait),
    };

    trace!(
        cloud = ?cloud_config,
        schedule = ?schedule_config,
        messaging = ?messaging_config,
        "using config:"
    );

    let interrupt = Interrupt::new();
    tokio::spawn({
        let interrupt = interrupt.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutting down");
                    interrupt.trigger();
                }
                Err(err) => warn!("cannot listen for shutdown signal: {err}"),
            }
        }
    });

    let keys = KeyCache::new(config_store, &cloud_config.api_endpoint);
    let cloud = HttpCloud::new(cloud_config, interrupt.clone())?;
    let service = MessagingService::new(cloud, keys, messaging_config);

    let service = start_schedule(service, registry, schedule_config, interrupt).await;

    let metrics = service.cloud().client().metrics();
    info!(
        requests = metrics.total_requests(),
        success_rate = metrics.success_rate(),
        "gateway stopped"
    );

    Ok(())
}

/// Apply request overrides from the command line
fn request_config(cli: &Cli, defaults: &RequestConfig) -> RequestConfig {
    RequestConfig {
        timeout: cli.request_timeout.unwrap_or(defaults.timeout),
        min_interval: cli.request_min_interval.unwrap_or(defaults.min_interval),
        max_backoff: cli.request_max_backoff.unwrap_or(defaults.max_backoff),
        max_retries: cli.request_max_retries.unwrap_or(defaults.max_retries),
    }
}

/// Find the cloud backend to report to.
///
/// An endpoint and provisioning key given on the command line replace any
/// stored cloud config, and are stored for the next start. Otherwise the
/// stored config is used. Request settings on the command line apply in both
/// cases but are only stored along with a new endpoint.
async fn resolve_cloud_config(cli: &Cli, config_store: &Store) -> Result<CloudConfig, ConfigError> {
    let stored: Option<CloudConfig> = config::get(config_store).await?;

    if let (Some(api_endpoint), Some(provisioning_key)) =
        (&cli.cloud_api_endpoint, &cli.provisioning_key)
    {
        let request_defaults = stored
            .as_ref()
            .map(|config| config.request.clone())
            .unwrap_or_default();

        if let Some(stored) = &stored
            && &stored.api_endpoint != api_endpoint
        {
            warn!(
                "replacing stored cloud endpoint {} with {}",
                stored.api_endpoint, api_endpoint
            );
        }

        let cloud_config = CloudConfig {
            api_endpoint: api_endpoint.clone(),
            provisioning_key: provisioning_key.clone(),
            request: request_config(cli, &request_defaults),
        };
        config::put(config_store, &cloud_config).await?;

        Ok(cloud_config)
    } else if let Some(stored) = stored {
        Ok(CloudConfig {
            request: request_config(cli, &stored.request),
            ..stored
        })
    } else {
        Err(ConfigError::Missing)
    }
}
