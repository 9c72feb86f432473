// Per-job mutual exclusion for engine state transitions

use crate::models::JobId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Registry handing out one lock per job.
///
/// All state transitions for a given job (create, trigger, cancel, place)
/// run under that job's lock so read-modify-write of the trigger counter and
/// pending reference stays atomic; distinct jobs proceed fully in parallel.
/// There is deliberately no global lock.
#[derive(Default)]
pub struct JobLockRegistry {
    locks: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl JobLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `id`, waiting until any in-flight transition for
    /// the same job completes
    pub async fn acquire(&self, id: JobId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))))
        };
        trace!(job_id = %id, "Acquiring job lock");
        lock.lock_owned().await
    }
}
