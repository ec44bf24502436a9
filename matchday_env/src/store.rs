//! Match store abstraction: the system of record for fixtures and rosters.

use async_trait::async_trait;
use crate::error::StoreError;
use crate::types::{Fixture, FixtureUpdate, Player, TeamId};

/// Abstraction for the external store that owns fixtures, rosters and results.
///
/// # Implementations
///
/// - **Production**: `HttpMatchStore` - REST client against the match API
/// - **Simulation**: in-memory store with call log and fault injection
///
/// # Update Flow
///
/// ```text
/// Simulator                    Store
///   |                            |
///   |-- list_fixtures() -------->|
///   |<------------ [Fixture] ----|
///   |-- list_roster(team) ------>|
///   |<------------- [Player] ----|
///   |-- update_fixture(abs) ---->|   (status + absolute score, never a delta)
/// ```
#[async_trait]
pub trait MatchStore: Send + Sync + 'static {
    /// Returns every fixture with its current status.
    ///
    /// A failed fetch must be reported as an error, never as a partial list.
    async fn list_fixtures(&self) -> Result<Vec<Fixture>, StoreError>;
    
    /// Returns the players currently on a team.
    ///
    /// An empty roster is a valid answer, not an error.
    async fn list_roster(&self, team: TeamId) -> Result<Vec<Player>, StoreError>;
    
    /// Overwrites the live state of a fixture.
    ///
    /// Must be idempotent and tolerate duplicate or out-of-order delivery.
    async fn update_fixture(&self, update: &FixtureUpdate) -> Result<(), StoreError>;
}
