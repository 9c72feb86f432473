// Delivery loop draining the in-process gateway into the engine

use crate::engine::JobEngine;
use crate::gateway::InProcessGateway;
use crate::models::Identity;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, instrument};

/// Drives the in-process gateway the way the real backend would: a periodic
/// poll drains every registration whose instant has passed and invokes the
/// engine's trigger endpoint under the trusted scheduler identity.
pub struct Dispatcher {
    engine: Arc<JobEngine>,
    gateway: Arc<InProcessGateway>,
    trusted_identity: Identity,
    poll_interval: Duration,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<JobEngine>,
        gateway: Arc<InProcessGateway>,
        trusted_identity: Identity,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);
        Self {
            engine,
            gateway,
            trusted_identity,
            poll_interval,
            shutdown_tx,
        }
    }

    /// Get a shutdown signal receiver
    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Run the polling loop until a shutdown signal arrives
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            poll_interval_seconds = self.poll_interval.as_secs(),
            "Starting dispatcher"
        );

        let mut poll_interval = interval(self.poll_interval);
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    let delivered = self.deliver_due().await;
                    if delivered > 0 {
                        info!(delivered, "Delivered due invocations");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping dispatcher");
                    break;
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Stop the dispatcher gracefully
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(());
        // Let an in-flight delivery round finish.
        sleep(Duration::from_millis(200)).await;
    }

    /// Deliver every registration whose instant has passed. Per-job failures
    /// are logged and do not block the rest of the round.
    pub async fn deliver_due(&self) -> usize {
        let due = self.gateway.take_due(Utc::now());
        let mut delivered = 0;

        for (schedule_ref, payload) in due {
            match self
                .engine
                .trigger(payload.job_id, self.trusted_identity)
                .await
            {
                Ok(()) => {
                    delivered += 1;
                    debug!(
                        job_id = %payload.job_id,
                        schedule_ref = %schedule_ref,
                        "Invocation delivered"
                    );
                }
                Err(e) => {
                    error!(
                        job_id = %payload.job_id,
                        schedule_ref = %schedule_ref,
                        error = %e,
                        "Delivery failed"
                    );
                }
            }
        }

        delivered
    }
}
