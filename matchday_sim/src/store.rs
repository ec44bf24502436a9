//! In-memory match store with fault injection.

use async_trait::async_trait;
use matchday_env::{Fixture, FixtureId, FixtureStatus, FixtureUpdate, MatchStore, Player, StoreError, TeamId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::debug;

/// One `update_fixture` call as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpdate {
    pub update: FixtureUpdate,

    /// Whether the call was rejected by fault injection
    pub failed: bool,
}

/// A backwards status transition observed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusViolation {
    pub fixture_id: FixtureId,
    pub from: FixtureStatus,
    pub to: FixtureStatus,
}

#[derive(Default)]
struct StoreState {
    /// Current state, updates applied
    fixtures: BTreeMap<FixtureId, Fixture>,

    /// State as first inserted, served instead when reads are stale
    seeded: BTreeMap<FixtureId, Fixture>,

    rosters: HashMap<TeamId, Vec<Player>>,

    log: Vec<RecordedUpdate>,

    violations: Vec<StatusViolation>,

    fail_fetches: u32,

    fail_updates: u32,

    fail_rosters: u32,

    stale_reads: bool,

    fetch_calls: u64,
}

/// Match store held in memory for the simulation harness.
///
/// Updates are applied as absolute overwrites. Every call to
/// `update_fixture` is logged, including injected failures.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a fixture.
    pub fn insert_fixture(&self, fixture: Fixture) {
        let mut state = self.state.lock().unwrap();
        state.seeded.insert(fixture.id, fixture.clone());
        state.fixtures.insert(fixture.id, fixture);
    }

    /// Sets a team's roster. An empty list is a valid roster.
    pub fn set_roster(&self, team: TeamId, players: Vec<Player>) {
        self.state.lock().unwrap().rosters.insert(team, players);
    }

    /// Fails the next `n` fixture listings.
    pub fn fail_next_fetches(&self, n: u32) {
        self.state.lock().unwrap().fail_fetches = n;
    }

    /// Fails the next `n` update calls.
    pub fn fail_next_updates(&self, n: u32) {
        self.state.lock().unwrap().fail_updates = n;
    }

    /// Fails the next `n` roster lookups.
    pub fn fail_next_rosters(&self, n: u32) {
        self.state.lock().unwrap().fail_rosters = n;
    }

    /// Serves fixture listings as first inserted, ignoring applied updates.
    ///
    /// Models a store whose reads lag behind its writes.
    pub fn set_stale_reads(&self, stale: bool) {
        self.state.lock().unwrap().stale_reads = stale;
    }

    /// Current state of a fixture.
    pub fn fixture(&self, id: FixtureId) -> Option<Fixture> {
        self.state.lock().unwrap().fixtures.get(&id).cloned()
    }

    /// Current state of every fixture, ordered by id.
    pub fn fixtures(&self) -> Vec<Fixture> {
        self.state.lock().unwrap().fixtures.values().cloned().collect()
    }

    /// Every update call so far, in arrival order.
    pub fn update_log(&self) -> Vec<RecordedUpdate> {
        self.state.lock().unwrap().log.clone()
    }

    /// Successfully applied updates for one fixture, in arrival order.
    pub fn applied_updates(&self, id: FixtureId) -> Vec<FixtureUpdate> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|r| !r.failed && r.update.fixture_id == id)
            .map(|r| r.update.clone())
            .collect()
    }

    pub fn violations(&self) -> Vec<StatusViolation> {
        self.state.lock().unwrap().violations.clone()
    }

    pub fn fetch_calls(&self) -> u64 {
        self.state.lock().unwrap().fetch_calls
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn list_fixtures(&self) -> Result<Vec<Fixture>, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls += 1;

        if state.fail_fetches > 0 {
            state.fail_fetches -= 1;
            return Err(StoreError::unavailable("injected fetch failure"));
        }

        let source = if state.stale_reads { &state.seeded } else { &state.fixtures };
        Ok(source.values().cloned().collect())
    }

    async fn list_roster(&self, team: TeamId) -> Result<Vec<Player>, StoreError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_rosters > 0 {
            state.fail_rosters -= 1;
            return Err(StoreError::unavailable("injected roster failure"));
        }

        Ok(state.rosters.get(&team).cloned().unwrap_or_default())
    }

    async fn update_fixture(&self, update: &FixtureUpdate) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();

        if state.fail_updates > 0 {
            state.fail_updates -= 1;
            state.log.push(RecordedUpdate { update: update.clone(), failed: true });
            return Err(StoreError::transport("injected update failure"));
        }

        let Some(fixture) = state.fixtures.get(&update.fixture_id).cloned() else {
            return Err(StoreError::Status {
                status: 404,
                body: format!("no fixture {}", update.fixture_id),
            });
        };

        if !fixture.status.can_advance_to(update.status) {
            state.violations.push(StatusViolation {
                fixture_id: update.fixture_id,
                from: fixture.status,
                to: update.status,
            });
        }

        let applied = fixture.snapshot(update.status, update.home_team_score, update.away_team_score);
        debug!(
            fixture_id = %update.fixture_id,
            status = %update.status,
            home = update.home_team_score,
            away = update.away_team_score,
            "store applied update"
        );
        state.fixtures.insert(update.fixture_id, applied);
        state.log.push(RecordedUpdate { update: update.clone(), failed: false });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fixture(id: u64) -> Fixture {
        let kickoff = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Fixture::scheduled(FixtureId(id), 1, kickoff, TeamId(1), TeamId(2))
    }

    #[tokio::test]
    async fn test_updates_overwrite_state() {
        let store = InMemoryStore::new();
        store.insert_fixture(fixture(1));

        store
            .update_fixture(&FixtureUpdate::new(FixtureId(1), FixtureStatus::Live, 1, 0))
            .await
            .unwrap();
        store
            .update_fixture(&FixtureUpdate::new(FixtureId(1), FixtureStatus::Finished, 2, 1))
            .await
            .unwrap();

        let stored = store.fixture(FixtureId(1)).unwrap();
        assert_eq!(stored.status, FixtureStatus::Finished);
        assert_eq!((stored.home.score, stored.away.score), (2, 1));
        assert!(store.violations().is_empty());
        assert_eq!(store.applied_updates(FixtureId(1)).len(), 2);
    }

    #[tokio::test]
    async fn test_backwards_status_is_recorded() {
        let store = InMemoryStore::new();
        store.insert_fixture(fixture(1));

        store
            .update_fixture(&FixtureUpdate::new(FixtureId(1), FixtureStatus::Finished, 1, 0))
            .await
            .unwrap();
        store
            .update_fixture(&FixtureUpdate::new(FixtureId(1), FixtureStatus::Live, 1, 0))
            .await
            .unwrap();

        assert_eq!(
            store.violations(),
            vec![StatusViolation {
                fixture_id: FixtureId(1),
                from: FixtureStatus::Finished,
                to: FixtureStatus::Live,
            }]
        );
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemoryStore::new();
        store.insert_fixture(fixture(1));
        store.fail_next_fetches(1);
        store.fail_next_updates(1);

        assert!(store.list_fixtures().await.is_err());
        assert_eq!(store.list_fixtures().await.unwrap().len(), 1);

        let update = FixtureUpdate::new(FixtureId(1), FixtureStatus::Live, 0, 0);
        let err = store.update_fixture(&update).await.unwrap_err();
        assert!(err.is_retryable());
        store.update_fixture(&update).await.unwrap();

        let log = store.update_log();
        assert_eq!(log.len(), 2);
        assert!(log[0].failed);
        assert!(!log[1].failed);
        assert_eq!(store.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_roster_fault_injection() {
        let store = InMemoryStore::new();
        store.set_roster(TeamId(1), vec![Player::with_power(1, 60)]);
        store.fail_next_rosters(2);

        assert!(store.list_roster(TeamId(1)).await.unwrap_err().is_retryable());
        assert!(store.list_roster(TeamId(2)).await.is_err());
        assert_eq!(store.list_roster(TeamId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_reads_serve_seeded_state() {
        let store = InMemoryStore::new();
        store.insert_fixture(fixture(1));
        store.set_stale_reads(true);

        store
            .update_fixture(&FixtureUpdate::new(FixtureId(1), FixtureStatus::Live, 0, 0))
            .await
            .unwrap();

        let listed = store.list_fixtures().await.unwrap();
        assert_eq!(listed[0].status, FixtureStatus::Scheduled);
        assert_eq!(store.fixture(FixtureId(1)).unwrap().status, FixtureStatus::Live);
    }

    #[tokio::test]
    async fn test_unknown_fixture_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update_fixture(&FixtureUpdate::new(FixtureId(9), FixtureStatus::Live, 0, 0))
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(store.list_roster(TeamId(1)).await.unwrap().is_empty());
    }
}
