// Daemon entry point: wires the job engine to the in-process gateway and
// runs the delivery loop until shutdown

use common::config::Settings;
use common::dispatch::Dispatcher;
use common::engine::{EngineConfig, JobEngine};
use common::gateway::InProcessGateway;
use common::models::{Identity, JobKind};
use common::seed::OsSeedSource;
use common::store::{InMemoryJobStore, JobStore};
use common::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (settings, load_error) = match Settings::load() {
        Ok(settings) => (settings, None),
        Err(e) => (Settings::default(), Some(e)),
    };

    telemetry::init_logging(&settings.observability.log_level)?;
    if let Some(e) = load_error {
        warn!(error = %e, "No configuration loaded, falling back to defaults");
    }

    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_metrics(settings.observability.metrics_port)?;
    info!("Starting rebook scheduler");

    // Restore the job store from the snapshot of a previous run, if any.
    let store = match &settings.store.snapshot_path {
        Some(path) => Arc::new(InMemoryJobStore::from_snapshot(path).await?),
        None => Arc::new(InMemoryJobStore::new()),
    };

    let gateway = Arc::new(InProcessGateway::new(settings.gateway.capacity_per_slot));
    info!(
        capacity_per_slot = settings.gateway.capacity_per_slot,
        "In-process scheduling gateway initialized"
    );

    let engine = Arc::new(
        JobEngine::new(
            EngineConfig::from(&settings.engine),
            Arc::clone(&store) as Arc<dyn JobStore>,
            gateway.clone(),
            Arc::new(OsSeedSource),
        )
        .await?,
    );
    info!("Job engine created");

    if settings.demo.enabled {
        let owner = Identity::random();
        match engine
            .create_job(owner, JobKind::Recurring, settings.demo.interval_seconds)
            .await
        {
            Ok(job_id) => info!(
                job_id = %job_id,
                owner = %owner,
                interval_seconds = settings.demo.interval_seconds,
                "Demo chain created"
            ),
            Err(e) => error!(error = %e, "Failed to create demo chain"),
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        gateway,
        Identity(settings.engine.trusted_scheduler_id),
        Duration::from_secs(settings.dispatcher.poll_interval_seconds),
    ));

    let dispatcher_for_shutdown = dispatcher.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        info!("Received Ctrl+C signal, initiating graceful shutdown");
        dispatcher_for_shutdown.stop().await;
    });

    dispatcher.start().await;

    if let Some(path) = &settings.store.snapshot_path {
        if let Err(e) = store.save_snapshot(path).await {
            error!(error = %e, path = %path, "Failed to write job store snapshot");
        }
    }

    info!("Scheduler stopped");
    Ok(())
}
