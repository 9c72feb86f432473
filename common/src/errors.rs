// Error handling framework

use crate::models::{Identity, JobId};
use thiserror::Error;

/// Errors returned synchronously from engine operations.
///
/// These are rejected to the caller and never retried. Placement failures
/// inside the recurrence path never show up here; they stall the chain
/// instead (see the engine Place step).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid interval: {0} seconds (must be > 0)")]
    InvalidInterval(i64),

    #[error("Caller {caller} is not authorized for {job_id}")]
    Unauthorized { job_id: JobId, caller: Identity },

    #[error("One-shot {0} has already fired")]
    AlreadyTriggered(JobId),

    #[error("Owner {owner} already has an active recurring chain ({job_id})")]
    AlreadyActive { owner: Identity, job_id: JobId },

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

/// Capacity probe failures
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("No admissible instant found after {attempts} backoff candidates")]
    Exhausted { attempts: u32 },

    #[error("Gateway error during capacity probe: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Seed source error during capacity probe: {0}")]
    Seed(#[from] SeedError),
}

/// Errors crossing the scheduling gateway boundary
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Registration rejected by gateway: {0}")]
    ScheduleRejected(String),

    #[error("Cancellation rejected by gateway: {0}")]
    CancelRejected(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Random seed source errors
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Seed source unavailable: {0}")]
    Unavailable(String),
}

/// Job store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("Snapshot I/O failed: {0}")]
    Io(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_interval_display() {
        let err = EngineError::InvalidInterval(-5);
        assert!(err.to_string().contains("-5 seconds"));
    }

    #[test]
    fn test_already_triggered_display() {
        let err = EngineError::AlreadyTriggered(JobId(9));
        assert!(err.to_string().contains("job-9"));
    }

    #[test]
    fn test_probe_exhausted_display() {
        let err = ProbeError::Exhausted { attempts: 8 };
        assert!(err.to_string().contains("8 backoff candidates"));
    }

    #[test]
    fn test_gateway_error_wraps_into_probe_error() {
        let err: ProbeError = GatewayError::Unavailable("down".to_string()).into();
        assert!(matches!(err, ProbeError::Gateway(_)));
    }

    #[test]
    fn test_store_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
