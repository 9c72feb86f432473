// In-process scheduling gateway with per-slot capacity accounting.
// Backs the local daemon and the integration tests; a production deployment
// would point the engine at the real backend instead.

use crate::errors::GatewayError;
use crate::gateway::SchedulingGateway;
use crate::models::{ScheduleRef, TriggerPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// One registered future invocation awaiting delivery
#[derive(Debug, Clone)]
struct Registration {
    target: String,
    instant: DateTime<Utc>,
    resource_cost: u64,
    payload: TriggerPayload,
}

#[derive(Debug, Default)]
struct GatewayState {
    /// Resource units booked per one-second slot, keyed by unix timestamp
    booked: BTreeMap<i64, u64>,
    pending: HashMap<ScheduleRef, Registration>,
}

/// Admission-controlled gateway keeping all state in memory.
///
/// Capacity is tracked at one-second granularity: every registration books
/// its resource cost against the slot containing its instant, and a slot
/// rejects registrations once the configured budget is spent.
pub struct InProcessGateway {
    capacity_per_slot: u64,
    state: Mutex<GatewayState>,
}

impl InProcessGateway {
    pub fn new(capacity_per_slot: u64) -> Self {
        Self {
            capacity_per_slot,
            state: Mutex::new(GatewayState::default()),
        }
    }

    /// Book capacity in a slot without registering an invocation. Models
    /// load placed by other tenants of the gateway.
    pub fn reserve(&self, instant: DateTime<Utc>, resource_cost: u64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("gateway state poisoned");
        let slot = state.booked.entry(instant.timestamp()).or_insert(0);
        if slot.saturating_add(resource_cost) > self.capacity_per_slot {
            return Err(GatewayError::ScheduleRejected(format!(
                "slot {} has no capacity for {} units",
                instant.timestamp(),
                resource_cost
            )));
        }
        *slot += resource_cost;
        Ok(())
    }

    /// Drain registrations whose instant has passed. Each registration is
    /// returned exactly once, ordered by instant.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<(ScheduleRef, TriggerPayload)> {
        let mut state = self.state.lock().expect("gateway state poisoned");

        let mut due: Vec<(ScheduleRef, Registration)> = Vec::new();
        state.pending.retain(|schedule_ref, registration| {
            if registration.instant <= now {
                due.push((schedule_ref.clone(), registration.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, registration)| registration.instant);

        // Past slots are never queried again; drop their accounting.
        state.booked = state.booked.split_off(&(now.timestamp() + 1));

        due.into_iter()
            .map(|(schedule_ref, registration)| (schedule_ref, registration.payload))
            .collect()
    }

    /// Number of registrations awaiting delivery
    pub fn pending_count(&self) -> usize {
        self.state.lock().expect("gateway state poisoned").pending.len()
    }
}

#[async_trait]
impl SchedulingGateway for InProcessGateway {
    async fn has_capacity(
        &self,
        instant: DateTime<Utc>,
        resource_cost: u64,
    ) -> Result<bool, GatewayError> {
        let state = self.state.lock().expect("gateway state poisoned");
        let used = state.booked.get(&instant.timestamp()).copied().unwrap_or(0);
        Ok(used.saturating_add(resource_cost) <= self.capacity_per_slot)
    }

    async fn schedule(
        &self,
        target: &str,
        instant: DateTime<Utc>,
        resource_cost: u64,
        payload: TriggerPayload,
    ) -> Result<ScheduleRef, GatewayError> {
        let mut state = self.state.lock().expect("gateway state poisoned");

        let slot = state.booked.entry(instant.timestamp()).or_insert(0);
        if slot.saturating_add(resource_cost) > self.capacity_per_slot {
            warn!(
                target,
                instant = %instant,
                resource_cost,
                "Registration rejected: slot saturated"
            );
            return Err(GatewayError::ScheduleRejected(format!(
                "slot {} has no capacity for {} units",
                instant.timestamp(),
                resource_cost
            )));
        }
        *slot += resource_cost;

        let schedule_ref = ScheduleRef(Uuid::new_v4().to_string());
        state.pending.insert(
            schedule_ref.clone(),
            Registration {
                target: target.to_string(),
                instant,
                resource_cost,
                payload,
            },
        );

        debug!(
            target,
            instant = %instant,
            schedule_ref = %schedule_ref,
            "Invocation registered"
        );
        Ok(schedule_ref)
    }

    async fn cancel(&self, schedule_ref: &ScheduleRef) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("gateway state poisoned");

        let registration = state.pending.remove(schedule_ref).ok_or_else(|| {
            GatewayError::CancelRejected(format!(
                "reference {} is unknown or already fired",
                schedule_ref
            ))
        })?;

        if let Some(slot) = state.booked.get_mut(&registration.instant.timestamp()) {
            *slot = slot.saturating_sub(registration.resource_cost);
        }

        debug!(
            schedule_ref = %schedule_ref,
            target = %registration.target,
            "Registration cancelled"
        );
        Ok(())
    }
}
