// Core data model for the self-rescheduling job engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique, monotonically assigned job identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Identity of a job owner or a caller on the trigger/cancel path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub Uuid);

impl Identity {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// JobKind distinguishes a single future firing from a recurring chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    OneShot,
    Recurring,
}

/// Opaque handle identifying one registered future invocation at the gateway.
///
/// The engine treats it as a serializable key for exactly one cancel call and
/// assumes nothing about its internal structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleRef(pub String);

impl fmt::Display for ScheduleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payload attached to a gateway registration and delivered back on firing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub job_id: JobId,
}

/// Job is the unit of one-shot or recurring future work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: Identity,
    pub kind: JobKind,
    /// Spacing between firings in seconds; also the initial delay. Always > 0.
    pub interval_seconds: i64,
    /// Instant targeted by the current or most recently placed invocation
    pub next_fire_time: DateTime<Utc>,
    /// Number of times this job has successfully fired
    pub trigger_count: u32,
    /// Whether the chain should continue placing new invocations
    pub active: bool,
    /// At most one outstanding gateway registration exists per job
    pub pending_schedule_ref: Option<ScheduleRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Read-only status projection exposed by the engine
    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            kind: self.kind,
            next_fire_time: self.next_fire_time,
            trigger_count: self.trigger_count,
            active: self.active,
        }
    }
}

/// Read-only snapshot of a single job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub kind: JobKind,
    pub next_fire_time: DateTime<Utc>,
    pub trigger_count: u32,
    pub active: bool,
}
