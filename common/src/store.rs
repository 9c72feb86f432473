// Keyed job store; the engine is the sole writer

use crate::errors::StoreError;
use crate::models::{Job, JobId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Durable keyed storage for job records.
///
/// Readers may run concurrently with in-flight mutations but always observe
/// a whole-record snapshot; partial updates are never visible.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;
    async fn put(&self, job: &Job) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<Job>, StoreError>;
}

/// Job store backed by an in-memory map with JSON snapshot persistence
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a store from a JSON snapshot. A missing file yields an empty
    /// store so a first run needs no setup.
    pub async fn from_snapshot<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new());
        }

        let bytes = tokio::fs::read(path).await?;
        let jobs: Vec<Job> = serde_json::from_slice(&bytes)?;
        info!(
            path = %path.display(),
            job_count = jobs.len(),
            "Job store restored from snapshot"
        );

        Ok(Self {
            jobs: RwLock::new(jobs.into_iter().map(|job| (job.id, job)).collect()),
        })
    }

    /// Write all records to a JSON snapshot, ordered by id
    pub async fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);

        let bytes = serde_json::to_vec_pretty(&jobs)?;
        tokio::fs::write(path.as_ref(), bytes).await?;
        info!(
            path = %path.as_ref().display(),
            job_count = jobs.len(),
            "Job store snapshot written"
        );
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn put(&self, job: &Job) -> Result<(), StoreError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }
}
