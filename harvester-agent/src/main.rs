//! Harvester Agent
//!
//! A long-running process that keeps remote backends supplied with workers
//! and tracks them until they reach a terminal state.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Services: Submission, monitoring and artifact retrieval per cycle
//! - Scheduler: Fixed-interval cycle loop owning the worker list
//!
//! Backends are reached through `harvester-client`; site settings come from
//! a JSON queue configuration file.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvester_agent::config::Config;
use harvester_agent::scheduler::CyclePoller;
use harvester_agent::service::{
    BackendRegistry, JobBroker, QueueCapacityBroker, QueueConfigMapper, QueueConfigSource,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harvester_agent=info,harvester_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Harvester Agent");

    let config = load_config()?;
    info!(
        "Loaded configuration: harvester_id={}, queue_config={}",
        config.harvester_id,
        config.queue_config_path.display()
    );

    let queues: Arc<dyn QueueConfigSource> = Arc::new(
        QueueConfigMapper::load(&config.queue_config_path)
            .context("Failed to load queue configuration")?,
    );
    info!("Configured queues: {}", queues.queue_names().join(", "));

    let backends = Arc::new(
        BackendRegistry::from_queues(queues.as_ref(), config.call_timeout)
            .context("Failed to create backend clients")?,
    );
    let broker: Arc<dyn JobBroker> = Arc::new(QueueCapacityBroker::new(Arc::clone(&queues)));

    info!("Services initialized");
    info!(
        "Poll interval: {:?}, call timeout: {:?}, max concurrent calls: {}",
        config.poll_interval, config.call_timeout, config.max_concurrent_calls
    );

    let mut poller = CyclePoller::new(config, queues, broker, backends);

    if let Err(e) = poller.run().await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    info!("Harvester Agent stopped");
    Ok(())
}

/// Loads configuration from environment variables
fn load_config() -> Result<Config> {
    let config = Config::from_env()?;
    config.validate()?;
    Ok(config)
}
