// SchedulingGateway boundary contract

use crate::errors::GatewayError;
use crate::models::{ScheduleRef, TriggerPayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod inproc;

pub use inproc::InProcessGateway;

/// Admission-controlled external service that registers future invocations.
///
/// Assumed delivery semantics the engine relies on: one invocation delivered
/// at-or-after the registered instant per successful `schedule` call, no
/// duplicates, no silent drops once accepted, delivered under the gateway's
/// trusted identity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulingGateway: Send + Sync {
    /// Whether a registration at `instant` costing `resource_cost` units
    /// would currently be accepted. Read-only; capacity at query time is not
    /// a guarantee that capacity remains at registration time.
    async fn has_capacity(
        &self,
        instant: DateTime<Utc>,
        resource_cost: u64,
    ) -> Result<bool, GatewayError>;

    /// Register a future invocation of `target` at `instant`, carrying
    /// `payload` back to the engine when it fires
    async fn schedule(
        &self,
        target: &str,
        instant: DateTime<Utc>,
        resource_cost: u64,
        payload: TriggerPayload,
    ) -> Result<ScheduleRef, GatewayError>;

    /// Best-effort cancellation of a previously registered invocation; may
    /// fail if the invocation already fired or the reference is stale
    async fn cancel(&self, schedule_ref: &ScheduleRef) -> Result<(), GatewayError>;
}
