//! Core environment context trait for the matchday simulator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand_chacha::ChaCha8Rng;
use std::future::Future;
use std::time::Duration;

use crate::types::FixtureId;

/// The central interface for environment interaction.
///
/// This trait abstracts the "real world" so that the orchestrator and the
/// per-fixture timers run unchanged in production (tokio, system clock) and in
/// the deterministic harness (virtual clock, seeded RNG).
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy
/// - **Simulation**: `SimContext` - virtual clock, `ChaCha8Rng(seed)`
#[async_trait]
pub trait SimulatorContext: Send + Sync + 'static {
    /// Returns the current wall-clock time.
    ///
    /// Compared against fixture kick-off times. In simulation this is the
    /// virtual clock.
    fn system_time(&self) -> DateTime<Utc>;
    
    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: parks until the virtual clock reaches the wake time
    async fn sleep(&self, duration: Duration);
    
    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
    
    /// Returns the random stream used to play out one fixture.
    ///
    /// The simulation combines the global seed with the fixture id so each
    /// fixture gets a reproducible, independent stream.
    fn fixture_rng(&self, fixture: FixtureId) -> ChaCha8Rng;
    
    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
