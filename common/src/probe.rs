// Capacity probe: exponential backoff + jitter search for an admissible
// instant at the scheduling gateway

use crate::errors::ProbeError;
use crate::gateway::SchedulingGateway;
use crate::seed::RandomSeedSource;
use crate::telemetry;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Fixed per-placement probe budget
pub const DEFAULT_MAX_PROBE_ATTEMPTS: u32 = 8;

/// Pure slot-search algorithm over the gateway's capacity query.
///
/// The ideal instant is always preferred; only when it is saturated does the
/// probe fan candidates out across an expanding `2^i + jitter` window so that
/// competing callers targeting the same instant spread apart instead of
/// colliding again.
pub struct CapacityProbe {
    gateway: Arc<dyn SchedulingGateway>,
    seed_source: Arc<dyn RandomSeedSource>,
}

impl CapacityProbe {
    pub fn new(gateway: Arc<dyn SchedulingGateway>, seed_source: Arc<dyn RandomSeedSource>) -> Self {
        Self {
            gateway,
            seed_source,
        }
    }

    /// Backoff candidate for `attempt`: `desired + 2^attempt + jitter`
    /// seconds, with `0 <= jitter < 2^attempt`. The jitter is derived from
    /// the probe seed, so a seed fully determines the candidate schedule.
    pub fn candidate(desired: DateTime<Utc>, seed: u64, attempt: u32) -> DateTime<Utc> {
        let base_delay = 1i64 << attempt;
        let jitter = i64::from(jitter_bits(seed, attempt)) % base_delay;
        desired + Duration::seconds(base_delay + jitter)
    }

    /// Find an admissible instant at or after `desired`, trying the desired
    /// instant first and then exactly `max_attempts` backoff candidates.
    #[instrument(skip(self), fields(desired = %desired, resource_cost, max_attempts))]
    pub async fn find(
        &self,
        desired: DateTime<Utc>,
        resource_cost: u64,
        max_attempts: u32,
    ) -> Result<DateTime<Utc>, ProbeError> {
        if self.gateway.has_capacity(desired, resource_cost).await? {
            telemetry::record_probe_attempts(0);
            return Ok(desired);
        }

        // One seed for the entire sequence keeps the candidates auditable.
        let seed = self.seed_source.seed().await?;

        for attempt in 0..max_attempts {
            let candidate = Self::candidate(desired, seed, attempt);
            if self.gateway.has_capacity(candidate, resource_cost).await? {
                debug!(
                    attempt,
                    candidate = %candidate,
                    "Admissible instant found"
                );
                telemetry::record_probe_attempts(attempt + 1);
                return Ok(candidate);
            }
        }

        telemetry::record_probe_attempts(max_attempts);
        Err(ProbeError::Exhausted {
            attempts: max_attempts,
        })
    }
}

/// Low 16 bits of `SHA-256(seed || attempt)`
fn jitter_bits(seed: u64, attempt: u32) -> u16 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_be_bytes());
    hasher.update(attempt.to_be_bytes());
    let digest = hasher.finalize();
    u16::from_be_bytes([digest[30], digest[31]])
}
