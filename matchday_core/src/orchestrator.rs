//! Simulator - Orchestrates fixture simulations against the match store.
//!
//! This module provides the integration layer between the pure tick engine
//! ([`FixtureSimulation`]) and the environment abstraction
//! ([`SimulatorContext`], [`MatchStore`]).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Simulator                           │
//! │  ┌───────────────┐   synchronize()    ┌──────────────────┐  │
//! │  │ scheduled     │◄───── 15 min ──────│   MatchStore     │  │
//! │  │ fixtures      │                    │  (list/update)   │  │
//! │  └──────┬────────┘                    └────────▲─────────┘  │
//! │         │ simulate() every 1 min               │            │
//! │  ┌──────▼────────┐  spawn_live   ┌──────────┐  │            │
//! │  │ active        │──────────────►│ fixture  │──┼─ goal ──┐  │
//! │  │ registry      │◄── finish ────│  task    │  │         │  │
//! │  └───────────────┘               └──────────┘  │   ┌─────▼┐ │
//! │                                                └───│queue │ │
//! │                                   UpdatePublisher  └──────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use matchday_core::{Simulator, SimulatorConfig};
//! use matchday_env::{HttpMatchStore, TokioContext};
//!
//! let store = Arc::new(HttpMatchStore::new(http_config)?);
//! let mut simulator = Simulator::new(TokioContext::shared(), store, SimulatorConfig::default())?;
//!
//! let (stop, shutdown) = tokio::sync::watch::channel(false);
//! simulator.start(shutdown).await;
//! ```

use crate::error::SimulatorError;
use crate::publisher::{update_queue, UpdatePublisher, UpdateSender};
use crate::simulation::{
    FixtureSimulation, PlaybackMode, SimulationHooks, DEFAULT_REGULATION_MINUTES,
};
use crate::strength::{Roster, TeamStrength};
use chrono::{DateTime, Utc};
use matchday_env::{
    Fixture, FixtureId, FixtureStatus, FixtureUpdate, MatchStore, SimulatorContext, StoreError,
    TeamId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Virtual minutes per fixture (default: 40)
    pub regulation_minutes: u32,

    /// Wall-clock time per virtual minute in live mode (default: 60s)
    pub tick_interval: Duration,

    /// How often the scheduled cache is refreshed (default: 15 min)
    pub sync_interval: Duration,

    /// How often due fixtures are looked for (default: 60s)
    pub scan_interval: Duration,

    /// Delivery attempts per store update (default: 3)
    pub publish_attempts: u32,

    /// First retry delay, doubled on each further attempt (default: 500ms)
    pub publish_base_delay: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            regulation_minutes: DEFAULT_REGULATION_MINUTES,
            tick_interval: Duration::from_secs(60),
            sync_interval: Duration::from_secs(15 * 60),
            scan_interval: Duration::from_secs(60),
            publish_attempts: 3,
            publish_base_delay: Duration::from_millis(500),
        }
    }
}

impl SimulatorConfig {
    pub fn with_regulation_minutes(mut self, minutes: u32) -> Self {
        self.regulation_minutes = minutes;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn with_publish_retry(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.publish_attempts = attempts;
        self.publish_base_delay = base_delay;
        self
    }

    /// Rejects values that would stall or spin the simulator.
    pub fn validate(&self) -> Result<(), SimulatorError> {
        if self.regulation_minutes == 0 {
            return Err(SimulatorError::InvalidConfig(
                "regulation_minutes must be at least 1".into(),
            ));
        }
        if self.publish_attempts == 0 {
            return Err(SimulatorError::InvalidConfig(
                "publish_attempts must be at least 1".into(),
            ));
        }
        for (name, interval) in [
            ("sync_interval", self.sync_interval),
            ("scan_interval", self.scan_interval),
            ("tick_interval", self.tick_interval),
        ] {
            if interval.is_zero() {
                return Err(SimulatorError::InvalidConfig(format!("{name} must be non-zero")));
            }
            if chrono::Duration::from_std(interval).is_err() {
                return Err(SimulatorError::InvalidConfig(format!("{name} is out of range")));
            }
        }
        Ok(())
    }
}

/// Registry entry for a fixture that is currently being simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveFixture {
    pub mode: PlaybackMode,
    pub kickoff: DateTime<Utc>,
}

type Registry = Arc<Mutex<HashMap<FixtureId, ActiveFixture>>>;

/// Discovers due fixtures and keeps one simulation running per fixture.
///
/// Generic over the context and store implementations, allowing the same
/// orchestration code to run in production (tokio + REST) or in the
/// deterministic harness.
pub struct Simulator<Ctx, S>
where
    Ctx: SimulatorContext,
    S: MatchStore,
{
    /// Environment context
    context: Arc<Ctx>,

    /// System of record
    store: Arc<S>,

    config: SimulatorConfig,

    /// Fixtures last seen in `scheduled` status
    scheduled: Vec<Fixture>,

    /// Fixture id → running simulation. Written here on start, by finish hooks on end.
    active: Registry,

    /// Queue feeding the publisher task
    updates: UpdateSender,

    /// Direct delivery path for recovery
    publisher: UpdatePublisher<Ctx, S>,
}

impl<Ctx, S> Simulator<Ctx, S>
where
    Ctx: SimulatorContext,
    S: MatchStore,
{
    /// Creates a simulator and spawns its update publisher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(context: Arc<Ctx>, store: Arc<S>, config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;

        let publisher = UpdatePublisher::new(
            Arc::clone(&context),
            Arc::clone(&store),
            config.publish_attempts,
            config.publish_base_delay,
        );
        let (updates, queue) = update_queue();
        context.spawn("update-publisher", publisher.clone().run(queue));

        Ok(Self {
            context,
            store,
            config,
            scheduled: Vec::new(),
            active: Arc::new(Mutex::new(HashMap::new())),
            updates,
            publisher,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Cached fixtures still waiting for kick-off.
    pub fn scheduled(&self) -> &[Fixture] {
        &self.scheduled
    }

    /// Number of fixtures currently being simulated.
    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub fn is_active(&self, id: FixtureId) -> bool {
        self.active.lock().unwrap().contains_key(&id)
    }

    /// Ids of running simulations, sorted.
    pub fn active_fixtures(&self) -> Vec<FixtureId> {
        let mut ids: Vec<FixtureId> = self.active.lock().unwrap().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Refreshes the cache of scheduled fixtures from the store.
    ///
    /// On failure the previous cache is kept untouched.
    pub async fn synchronize(&mut self) -> Result<usize, StoreError> {
        let fixtures = self.store.list_fixtures().await?;
        let total = fixtures.len();

        self.scheduled = fixtures
            .into_iter()
            .filter(|f| f.status == FixtureStatus::Scheduled)
            .collect();

        info!(total, scheduled = self.scheduled.len(), "synchronized fixtures");
        Ok(self.scheduled.len())
    }

    /// Starts a live simulation for every due fixture that is not running yet.
    ///
    /// Returns the number of fixtures started.
    pub async fn simulate(&mut self) -> usize {
        let now = self.context.system_time();
        let due: Vec<Fixture> = self.scheduled
            .iter()
            .filter(|f| f.scheduled_at <= now && !self.is_active(f.id))
            .cloned()
            .collect();

        let mut started = 0;
        for fixture in due {
            if !self.is_pending(fixture.id) {
                continue;
            }
            let Some((home, away)) = self.load_rosters(&fixture).await else {
                continue;
            };

            self.enqueue(FixtureUpdate::new(fixture.id, FixtureStatus::Live, 0, 0));

            let goal_updates = self.updates.clone();
            let finish_updates = self.updates.clone();
            let registry = Arc::clone(&self.active);
            let hooks = SimulationHooks::new(
                move |snapshot| {
                    let _ = goal_updates.send(FixtureUpdate::from(snapshot));
                },
                move |snapshot| {
                    registry.lock().unwrap().remove(&snapshot.id);
                    info!(
                        fixture_id = %snapshot.id,
                        home = snapshot.home.score,
                        away = snapshot.away.score,
                        "fixture finished"
                    );
                    let _ = finish_updates.send(FixtureUpdate::from(&snapshot));
                },
            );

            let simulation = FixtureSimulation::new(
                fixture.clone(),
                &home,
                &away,
                self.config.regulation_minutes,
                self.context.fixture_rng(fixture.id),
                hooks,
            );

            info!(
                fixture_id = %fixture.id,
                home_strength = home.strength(),
                away_strength = away.strength(),
                "kick-off"
            );

            // Registered before the first tick: a one-minute fixture finishes inside spawn_live.
            self.register(&fixture, PlaybackMode::Live);
            simulation.spawn_live(Arc::clone(&self.context), self.config.tick_interval);
            started += 1;
        }

        if started > 0 {
            debug!(started, active = self.active_count(), "simulate pass");
        }
        started
    }

    /// Fast-forwards every cached fixture whose kick-off is already in the past.
    ///
    /// Runs once at start-up, before live scheduling. Only the terminal state
    /// is reported to the store. Returns the number of fixtures recovered.
    pub async fn recover_missed_matches(&mut self) -> usize {
        let now = self.context.system_time();
        let missed: Vec<Fixture> = self.scheduled
            .iter()
            .filter(|f| f.scheduled_at < now && !self.is_active(f.id))
            .cloned()
            .collect();

        let mut recovered = 0;
        for fixture in missed {
            if !self.is_pending(fixture.id) {
                continue;
            }
            let Some((home, away)) = self.load_rosters(&fixture).await else {
                continue;
            };

            let registry = Arc::clone(&self.active);
            let hooks = SimulationHooks::finish_only(move |snapshot| {
                registry.lock().unwrap().remove(&snapshot.id);
            });

            let simulation = FixtureSimulation::new(
                fixture.clone(),
                &home,
                &away,
                self.config.regulation_minutes,
                self.context.fixture_rng(fixture.id),
                hooks,
            );

            self.register(&fixture, PlaybackMode::Fast);
            let result = simulation.run_fast();

            info!(
                fixture_id = %result.id,
                home = result.home.score,
                away = result.away.score,
                "recovered missed fixture"
            );

            if let Err(e) = self.publisher.deliver(&FixtureUpdate::from(&result)).await {
                warn!(fixture_id = %result.id, error = %e, "failed to report recovered fixture");
            }
            recovered += 1;
        }

        recovered
    }

    /// Runs the simulator until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Start-up order: synchronize, recover missed fixtures, one simulate
    /// pass. Then synchronize every `sync_interval` and simulate every
    /// `scan_interval`. Running fixture tasks are left to finish on their own.
    pub async fn start(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            seed = self.context.seed(),
            regulation_minutes = self.config.regulation_minutes,
            "simulator starting"
        );

        if let Err(e) = self.synchronize().await {
            warn!(error = %e, "initial synchronize failed");
        }
        let recovered = self.recover_missed_matches().await;
        if recovered > 0 {
            info!(recovered, "caught up on missed fixtures");
        }
        self.simulate().await;

        let now = self.context.system_time();
        let mut next_sync = after(now, self.config.sync_interval);
        let mut next_scan = after(now, self.config.scan_interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let wake = next_sync.min(next_scan);
            let wait = (wake - self.context.system_time())
                .to_std()
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = self.context.sleep(wait) => {}
            }

            let now = self.context.system_time();
            if now >= next_sync {
                if let Err(e) = self.synchronize().await {
                    warn!(error = %e, "synchronize failed, keeping previous fixtures");
                }
                next_sync = after(now, self.config.sync_interval);
            }
            if now >= next_scan {
                self.simulate().await;
                next_scan = after(now, self.config.scan_interval);
            }
        }

        info!(active = self.active_count(), "simulator stopped");
    }

    /// Still cached as scheduled and not claimed by a simulation.
    ///
    /// A listing may carry the same fixture twice, and an earlier iteration of
    /// the same pass may already have started it.
    fn is_pending(&self, id: FixtureId) -> bool {
        !self.is_active(id) && self.scheduled.iter().any(|f| f.id == id)
    }

    /// Loads both rosters; `None` if either fails to load or is empty.
    async fn load_rosters(&self, fixture: &Fixture) -> Option<(Roster, Roster)> {
        let home = self.fetch_roster(fixture.id, fixture.home.team_id).await?;
        let away = self.fetch_roster(fixture.id, fixture.away.team_id).await?;

        if home.is_empty() || away.is_empty() {
            warn!(
                fixture_id = %fixture.id,
                home_players = home.len(),
                away_players = away.len(),
                "cannot start fixture without players"
            );
            return None;
        }

        Some((home, away))
    }

    async fn fetch_roster(&self, fixture: FixtureId, team: TeamId) -> Option<Roster> {
        match self.store.list_roster(team).await {
            Ok(players) => Some(Roster::new(players)),
            Err(e) => {
                warn!(fixture_id = %fixture, %team, error = %e, "failed to load roster");
                None
            }
        }
    }

    /// Records a running simulation and drops the fixture from the scheduled cache.
    fn register(&mut self, fixture: &Fixture, mode: PlaybackMode) {
        let entry = ActiveFixture {
            mode,
            kickoff: fixture.scheduled_at,
        };
        let previous = self.active.lock().unwrap().insert(fixture.id, entry);
        assert!(previous.is_none(), "duplicate simulation for fixture {}", fixture.id);

        self.scheduled.retain(|f| f.id != fixture.id);
    }

    fn enqueue(&self, update: FixtureUpdate) {
        if self.updates.send(update).is_err() {
            warn!("update publisher is gone, dropping update");
        }
    }
}

fn after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero())
}
