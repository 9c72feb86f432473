// RandomSeedSource boundary contract

use crate::errors::SeedError;
use async_trait::async_trait;
use rand::Rng;

/// Supplier of unpredictable fixed-width seeds.
///
/// The capacity probe draws exactly one seed per probe sequence, so the
/// candidate schedule for a given placement is reproducible from that seed.
/// No persisted state is required.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RandomSeedSource: Send + Sync {
    async fn seed(&self) -> Result<u64, SeedError>;
}

/// Seed source backed by the process RNG
#[derive(Debug, Default)]
pub struct OsSeedSource;

#[async_trait]
impl RandomSeedSource for OsSeedSource {
    async fn seed(&self) -> Result<u64, SeedError> {
        Ok(rand::thread_rng().gen())
    }
}

/// Fixed seed source for deterministic tests and replay
#[derive(Debug, Clone, Copy)]
pub struct FixedSeedSource(pub u64);

#[async_trait]
impl RandomSeedSource for FixedSeedSource {
    async fn seed(&self) -> Result<u64, SeedError> {
        Ok(self.0)
    }
}
