// Job engine: creation, triggering, cancellation, and invocation placement

use crate::config::EngineSettings;
use crate::errors::EngineError;
use crate::gateway::SchedulingGateway;
use crate::lock::JobLockRegistry;
use crate::models::{Identity, Job, JobId, JobKind, JobView, TriggerPayload};
use crate::probe::CapacityProbe;
use crate::seed::RandomSeedSource;
use crate::store::JobStore;
use crate::telemetry;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Engine configuration derived from [`EngineSettings`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target handed to the gateway for every registration
    pub target: String,
    /// Identity the gateway's deliveries are authenticated as
    pub trusted_scheduler_id: Identity,
    /// Resource units booked per registration
    pub resource_cost: u64,
    /// Backoff candidates per placement probe
    pub max_probe_attempts: u32,
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            target: settings.target.clone(),
            trusted_scheduler_id: Identity(settings.trusted_scheduler_id),
            resource_cost: settings.resource_cost,
            max_probe_attempts: settings.max_probe_attempts,
        }
    }
}

/// Owner of all job records and the only writer of the job store.
///
/// Every transition for a given job runs under that job's lock; distinct
/// jobs are processed in parallel.
pub struct JobEngine {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    gateway: Arc<dyn SchedulingGateway>,
    probe: CapacityProbe,
    locks: JobLockRegistry,
    /// At most one live recurring chain per owner
    chains: Mutex<HashMap<Identity, JobId>>,
    next_id: AtomicU64,
}

impl JobEngine {
    /// Build an engine over a (possibly restored) job store, seeding the id
    /// sequence past every persisted id and rebuilding the per-owner chain
    /// registry from live recurring jobs.
    pub async fn new(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        gateway: Arc<dyn SchedulingGateway>,
        seed_source: Arc<dyn RandomSeedSource>,
    ) -> Result<Self, EngineError> {
        let jobs = store.list().await?;

        let mut chains = HashMap::new();
        let mut next_id = 1u64;
        for job in &jobs {
            next_id = next_id.max(job.id.0 + 1);
            if job.kind == JobKind::Recurring && job.active {
                chains.insert(job.owner_id, job.id);
            }
        }

        if !jobs.is_empty() {
            info!(
                job_count = jobs.len(),
                live_chains = chains.len(),
                "Engine state recovered from job store"
            );
        }

        Ok(Self {
            config,
            probe: CapacityProbe::new(Arc::clone(&gateway), seed_source),
            store,
            gateway,
            locks: JobLockRegistry::new(),
            chains: Mutex::new(chains),
            next_id: AtomicU64::new(next_id),
        })
    }

    /// Start a one-shot job or a recurring chain.
    ///
    /// The first invocation targets `now + interval_seconds`. A placement
    /// failure does not fail creation; the job is returned live but without
    /// a pending registration (a stalled chain, observable via `get_job`).
    #[instrument(skip(self), fields(owner = %owner, kind = ?kind, interval_seconds))]
    pub async fn create_job(
        &self,
        owner: Identity,
        kind: JobKind,
        interval_seconds: i64,
    ) -> Result<JobId, EngineError> {
        if interval_seconds <= 0 {
            return Err(EngineError::InvalidInterval(interval_seconds));
        }

        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));

        if kind == JobKind::Recurring {
            let mut chains = self.chains.lock().await;
            if let Some(&existing) = chains.get(&owner) {
                return Err(EngineError::AlreadyActive {
                    owner,
                    job_id: existing,
                });
            }
            chains.insert(owner, id);
        }

        let _guard = self.locks.acquire(id).await;
        let now = Utc::now();
        let mut job = Job {
            id,
            owner_id: owner,
            kind,
            interval_seconds,
            next_fire_time: now + Duration::seconds(interval_seconds),
            trigger_count: 0,
            active: true,
            pending_schedule_ref: None,
            created_at: now,
            updated_at: now,
        };

        self.place(&mut job).await;

        if let Err(e) = self.store.put(&job).await {
            if kind == JobKind::Recurring {
                self.chains.lock().await.remove(&owner);
            }
            return Err(e.into());
        }

        telemetry::adjust_active_jobs(1.0);
        info!(
            job_id = %id,
            next_fire_time = %job.next_fire_time,
            pending = job.pending_schedule_ref.is_some(),
            "Job created"
        );
        Ok(id)
    }

    /// Record a firing, normally invoked by the trusted scheduler identity
    /// when a registration fires, or manually by the owner for diagnostics.
    ///
    /// A stale delivery arriving after cancellation is still recorded, but
    /// no replacement invocation is placed.
    #[instrument(skip(self), fields(job_id = %job_id, caller = %caller))]
    pub async fn trigger(&self, job_id: JobId, caller: Identity) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(job_id).await;

        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or(EngineError::NotFound(job_id))?;

        // Explicit allow-set: the owner or the trusted scheduler identity.
        if caller != job.owner_id && caller != self.config.trusted_scheduler_id {
            return Err(EngineError::Unauthorized { job_id, caller });
        }

        if job.kind == JobKind::OneShot && job.trigger_count >= 1 {
            return Err(EngineError::AlreadyTriggered(job_id));
        }

        job.trigger_count += 1;
        // The invocation that just fired is consumed.
        job.pending_schedule_ref = None;

        info!(
            trigger_count = job.trigger_count,
            kind = ?job.kind,
            "Job fired"
        );
        telemetry::record_job_triggered(job_id);

        match job.kind {
            JobKind::OneShot => {
                // The single firing is spent; the record stays inert.
                if job.active {
                    telemetry::adjust_active_jobs(-1.0);
                }
                job.active = false;
            }
            JobKind::Recurring if job.active => {
                job.next_fire_time += Duration::seconds(job.interval_seconds);
                self.place(&mut job).await;
            }
            JobKind::Recurring => {
                debug!("Stale invocation recorded for a cancelled chain");
            }
        }

        job.updated_at = Utc::now();
        self.store.put(&job).await?;
        Ok(())
    }

    /// Stop a chain and best-effort release its pending registration.
    ///
    /// Only the owner may cancel. A gateway-side cancel failure is absorbed:
    /// the local `active` flag is the ground truth for whether the chain
    /// continues, and `trigger` tolerates the stale delivery that may still
    /// arrive. Cancelling an already-inactive job is a no-op success.
    #[instrument(skip(self), fields(job_id = %job_id, caller = %caller))]
    pub async fn cancel(&self, job_id: JobId, caller: Identity) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(job_id).await;

        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or(EngineError::NotFound(job_id))?;

        if caller != job.owner_id {
            return Err(EngineError::Unauthorized { job_id, caller });
        }

        if !job.active && job.pending_schedule_ref.is_none() {
            debug!("Cancel of an inactive job is a no-op");
            return Ok(());
        }

        if let Some(schedule_ref) = job.pending_schedule_ref.take() {
            if let Err(e) = self.gateway.cancel(&schedule_ref).await {
                warn!(
                    schedule_ref = %schedule_ref,
                    error = %e,
                    "Gateway cancel failed; the registered invocation may still fire"
                );
                telemetry::record_cancel_failure(job_id);
            }
        }

        if job.active {
            telemetry::adjust_active_jobs(-1.0);
        }
        job.active = false;
        job.updated_at = Utc::now();
        self.store.put(&job).await?;

        if job.kind == JobKind::Recurring {
            let mut chains = self.chains.lock().await;
            if chains.get(&job.owner_id) == Some(&job_id) {
                chains.remove(&job.owner_id);
            }
        }

        info!("Job cancelled");
        Ok(())
    }

    /// Read-only status snapshot of a single job
    pub async fn get_job(&self, job_id: JobId) -> Result<JobView, EngineError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(EngineError::NotFound(job_id))?;
        Ok(job.view())
    }

    /// Probe for an admissible instant for the job's next firing and
    /// register it with the gateway.
    ///
    /// On any failure the job keeps `active = true` with no pending
    /// reference: the chain stalls silently, surfaced only through logs,
    /// metrics, and `get_job`. No retry is applied here beyond the bounded
    /// probe loop.
    async fn place(&self, job: &mut Job) {
        let desired = job.next_fire_time;

        let admissible = match self
            .probe
            .find(desired, self.config.resource_cost, self.config.max_probe_attempts)
            .await
        {
            Ok(instant) => instant,
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    desired = %desired,
                    error = %e,
                    "Capacity probe failed; chain stalls without a pending registration"
                );
                telemetry::record_chain_stalled(job.id, "probe");
                return;
            }
        };

        let payload = TriggerPayload { job_id: job.id };
        match self
            .gateway
            .schedule(&self.config.target, admissible, self.config.resource_cost, payload)
            .await
        {
            Ok(schedule_ref) => {
                debug!(
                    job_id = %job.id,
                    instant = %admissible,
                    schedule_ref = %schedule_ref,
                    "Invocation placed"
                );
                job.pending_schedule_ref = Some(schedule_ref);
                job.next_fire_time = admissible;
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    instant = %admissible,
                    error = %e,
                    "Gateway rejected registration; chain stalls without a pending registration"
                );
                telemetry::record_chain_stalled(job.id, "schedule");
            }
        }
    }
}
