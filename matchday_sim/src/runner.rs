//! Scenario runner - plays harness scenarios on a virtual clock.

use crate::context::SimContext;
use crate::scenarios::ScenarioId;
use crate::store::InMemoryStore;

use chrono::{DateTime, Utc};
use matchday_core::{FixtureSimulation, Roster, SimulationHooks, Simulator, SimulatorConfig, DEFAULT_REGULATION_MINUTES};
use matchday_env::{Fixture, FixtureId, FixtureStatus, Player, SimulatorContext, TeamId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

const MINUTE: Duration = Duration::from_secs(60);

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Fixtures the scenario played
    pub runs: usize,

    /// Virtual time elapsed, in minutes
    pub virtual_minutes: u64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Simulations started (live or recovered)
    pub fixtures_started: u64,

    /// Fixtures in `finished` state at the end
    pub fixtures_finished: u64,

    pub home_wins: u64,

    pub away_wins: u64,

    /// Finished fixtures with a level score (must stay 0)
    pub draws: u64,

    /// Goals across all finished fixtures
    pub goals: u64,

    /// Updates the store accepted
    pub updates_applied: u64,

    /// Updates rejected by fault injection
    pub updates_failed: u64,

    /// Backwards status transitions seen by the store
    pub status_violations: u64,
}

impl ScenarioMetrics {
    /// Tallies outcomes from the store's final state and update log.
    fn collect(store: &InMemoryStore, fixtures_started: u64) -> Self {
        let mut metrics = Self {
            fixtures_started,
            ..Default::default()
        };

        for fixture in store.fixtures() {
            if fixture.status == FixtureStatus::Finished {
                metrics.record_final(&fixture);
            }
        }

        for record in store.update_log() {
            if record.failed {
                metrics.updates_failed += 1;
            } else {
                metrics.updates_applied += 1;
            }
        }
        metrics.status_violations = store.violations().len() as u64;

        metrics
    }

    fn record_final(&mut self, fixture: &Fixture) {
        self.fixtures_finished += 1;
        self.goals += (fixture.home.score + fixture.away.score) as u64;
        match fixture.home.score.cmp(&fixture.away.score) {
            Ordering::Greater => self.home_wins += 1,
            Ordering::Less => self.away_wins += 1,
            Ordering::Equal => self.draws += 1,
        }
    }
}

/// Accumulates failed checks for one scenario run.
#[derive(Debug, Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn fail(&mut self, message: String) {
        self.failures.push(message);
    }

    fn ensure(&mut self, condition: bool, message: impl FnOnce() -> String) {
        if !condition {
            self.failures.push(message());
        }
    }

    /// Properties every scenario that plays fixtures through the store must keep.
    fn common(&mut self, metrics: &ScenarioMetrics) {
        self.ensure(metrics.draws == 0, || format!("{} fixtures finished level", metrics.draws));
        self.ensure(metrics.status_violations == 0, || {
            format!("{} backwards status transitions", metrics.status_violations)
        });
    }
}

/// Runs harness scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Fixture count override
    runs: Option<usize>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self { seed, runs: None }
    }

    /// Overrides how many fixtures each scenario plays.
    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = Some(runs.max(1));
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let runs = self.runs.unwrap_or_else(|| scenario.default_runs());
        info!(scenario = scenario.name(), seed = self.seed, runs, "starting scenario");

        let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                let mut checks = Checks::default();
                checks.fail(format!("failed to build runtime: {e}"));
                return self.finish(scenario, runs, &SimContext::new(self.seed), ScenarioMetrics::default(), checks);
            }
        };

        runtime.block_on(async {
            match scenario {
                ScenarioId::NoDraws => self.run_no_draws(runs).await,
                ScenarioId::StrengthBias => self.run_strength_bias(runs),
                ScenarioId::MissedRecovery => self.run_missed_recovery(runs).await,
                ScenarioId::EmptyRoster => self.run_empty_roster(runs).await,
                ScenarioId::DuplicateGuard => self.run_duplicate_guard(runs).await,
                ScenarioId::FlakyStore => self.run_flaky_store(runs).await,
                ScenarioId::MatchDay => self.run_match_day(runs).await,
            }
        })
    }

    /// MD-001: NoDraws - equal rosters, every fixture recovered in fast mode.
    ///
    /// **Assertion**: all fixtures finish, none level.
    async fn run_no_draws(&self, runs: usize) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let store = Arc::new(InMemoryStore::new());
        let mut checks = Checks::default();

        store.set_roster(TeamId(1), flat_roster(TeamId(1), 11, 50));
        store.set_roster(TeamId(2), flat_roster(TeamId(2), 11, 50));
        for i in 0..runs as u64 {
            store.insert_fixture(fixture(i + 1, context.epoch(), TeamId(1), TeamId(2)));
        }
        context.advance_time(Duration::from_secs(2 * 3600));

        let Some(mut simulator) = build_simulator(&context, &store, SimulatorConfig::default(), &mut checks) else {
            return self.finish(ScenarioId::NoDraws, runs, &context, ScenarioMetrics::default(), checks);
        };

        if let Err(e) = simulator.synchronize().await {
            checks.fail(format!("synchronize failed: {e}"));
        }
        let recovered = simulator.recover_missed_matches().await;

        let metrics = ScenarioMetrics::collect(&store, recovered as u64);
        checks.common(&metrics);
        checks.ensure(recovered == runs, || format!("recovered {recovered}/{runs}"));
        checks.ensure(metrics.fixtures_finished == runs as u64, || {
            format!("{}/{runs} fixtures finished", metrics.fixtures_finished)
        });

        self.finish(ScenarioId::NoDraws, runs, &context, metrics, checks)
    }

    /// MD-002: StrengthBias - 400 vs 100 strength played out directly.
    ///
    /// **Assertion**: the stronger home side wins more than 60% of fixtures.
    fn run_strength_bias(&self, runs: usize) -> ScenarioResult {
        let context = SimContext::new(self.seed);
        let home = Roster::new(flat_roster(TeamId(1), 8, 50));
        let away = Roster::new(flat_roster(TeamId(2), 2, 50));
        let mut checks = Checks::default();
        let mut metrics = ScenarioMetrics::default();

        for i in 0..runs as u64 {
            let id = FixtureId(i + 1);
            let result = FixtureSimulation::new(
                fixture(id.0, context.epoch(), TeamId(1), TeamId(2)),
                &home,
                &away,
                DEFAULT_REGULATION_MINUTES,
                context.fixture_rng(id),
                SimulationHooks::none(),
            )
            .run_fast();

            metrics.fixtures_started += 1;
            metrics.record_final(&result);
        }

        let rate = metrics.home_wins as f64 / runs as f64;
        debug!(rate, home_wins = metrics.home_wins, "strength bias");

        checks.common(&metrics);
        checks.ensure(rate > 0.6, || format!("home win rate {rate:.3} not above 0.6"));

        self.finish(ScenarioId::StrengthBias, runs, &context, metrics, checks)
    }

    /// MD-003: MissedRecovery - half the fixtures kicked off while offline.
    ///
    /// **Assertion**: each missed fixture gets exactly one `finished` update
    /// during start-up, future fixtures are untouched.
    async fn run_missed_recovery(&self, runs: usize) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let store = Arc::new(InMemoryStore::new());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut checks = Checks::default();

        let offline = Duration::from_secs(3 * 3600);
        let missed = (runs + 1) / 2;
        let mut ids = Vec::with_capacity(runs);
        for i in 0..runs as u64 {
            let (home, away) = (TeamId(2 * i + 1), TeamId(2 * i + 2));
            store.set_roster(home, random_roster(&mut rng, home));
            store.set_roster(away, random_roster(&mut rng, away));

            // Missed fixtures every 10 minutes from the epoch, the rest after the outage
            let offset = if (i as usize) < missed {
                MINUTE * (10 * i as u32)
            } else {
                offline + MINUTE * (30 + 10 * i as u32)
            };
            store.insert_fixture(fixture(i + 1, context.epoch() + to_chrono(offset), home, away));
            ids.push(FixtureId(i + 1));
        }
        context.advance_time(offline);

        let Some(mut simulator) = build_simulator(&context, &store, SimulatorConfig::default(), &mut checks) else {
            return self.finish(ScenarioId::MissedRecovery, runs, &context, ScenarioMetrics::default(), checks);
        };

        let (stop, shutdown) = watch::channel(false);
        let driver = async {
            context.run_for(MINUTE * 5).await;
            let _ = stop.send(true);
        };
        tokio::join!(simulator.start(shutdown), driver);

        for (i, id) in ids.iter().enumerate() {
            let updates = store.applied_updates(*id);
            if i < missed {
                let only_finished = updates.len() == 1 && updates[0].status == FixtureStatus::Finished;
                checks.ensure(only_finished, || format!("fixture {id} reported {updates:?}"));
            } else {
                checks.ensure(updates.is_empty(), || format!("future fixture {id} was touched"));
            }
        }
        checks.ensure(simulator.active_count() == 0, || {
            format!("{} simulations still active", simulator.active_count())
        });

        let metrics = ScenarioMetrics::collect(&store, missed as u64);
        checks.common(&metrics);
        checks.ensure(metrics.fixtures_finished == missed as u64, || {
            format!("{}/{missed} missed fixtures finished", metrics.fixtures_finished)
        });

        self.finish(ScenarioId::MissedRecovery, runs, &context, metrics, checks)
    }

    /// MD-004: EmptyRoster - home side has no players until ten minutes in.
    ///
    /// **Assertion**: no store update while the roster is empty, kick-off on
    /// the first scan after players arrive, normal finish afterwards.
    async fn run_empty_roster(&self, runs: usize) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let store = Arc::new(InMemoryStore::new());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut checks = Checks::default();

        let ids: Vec<FixtureId> = (1..=runs as u64).map(FixtureId).collect();
        for id in &ids {
            let (home, away) = (TeamId(2 * id.0 - 1), TeamId(2 * id.0));
            store.set_roster(home, Vec::new());
            store.set_roster(away, random_roster(&mut rng, away));
            store.insert_fixture(fixture(id.0, context.epoch() + to_chrono(MINUTE), home, away));
        }

        let Some(mut simulator) = build_simulator(&context, &store, SimulatorConfig::default(), &mut checks) else {
            return self.finish(ScenarioId::EmptyRoster, runs, &context, ScenarioMetrics::default(), checks);
        };

        let (stop, shutdown) = watch::channel(false);
        let driver = async {
            let mut observed = Vec::new();

            context.run_for(MINUTE * 10).await;
            observed.push(("while empty", store.update_log().is_empty()));
            observed.push((
                "still scheduled",
                store.fixtures().iter().all(|f| f.status == FixtureStatus::Scheduled),
            ));

            for id in &ids {
                let home = TeamId(2 * id.0 - 1);
                store.set_roster(home, random_roster(&mut rng, home));
            }
            context.run_for(MINUTE * 2).await;
            observed.push((
                "kicked off",
                ids.iter().all(|id| store.applied_updates(*id).first().map(|u| u.status) == Some(FixtureStatus::Live)),
            ));

            context.run_for(MINUTE * 45).await;
            let _ = stop.send(true);
            observed
        };
        let (_, observed) = tokio::join!(simulator.start(shutdown), driver);

        for (stage, ok) in observed {
            checks.ensure(ok, || format!("check failed: {stage}"));
        }

        let metrics = ScenarioMetrics::collect(&store, runs as u64);
        checks.common(&metrics);
        checks.ensure(metrics.fixtures_finished == runs as u64, || {
            format!("{}/{runs} fixtures finished", metrics.fixtures_finished)
        });

        self.finish(ScenarioId::EmptyRoster, runs, &context, metrics, checks)
    }

    /// MD-005: DuplicateGuard - the store keeps reporting fixtures as scheduled.
    ///
    /// **Assertion**: one simulation per fixture despite a resync every minute.
    async fn run_duplicate_guard(&self, runs: usize) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let store = Arc::new(InMemoryStore::new());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut checks = Checks::default();

        let ids: Vec<FixtureId> = (1..=runs as u64).map(FixtureId).collect();
        for id in &ids {
            let (home, away) = (TeamId(2 * id.0 - 1), TeamId(2 * id.0));
            store.set_roster(home, random_roster(&mut rng, home));
            store.set_roster(away, random_roster(&mut rng, away));
            store.insert_fixture(fixture(id.0, context.epoch(), home, away));
        }
        store.set_stale_reads(true);

        let Some(mut simulator) = build_simulator(&context, &store, SimulatorConfig::default(), &mut checks) else {
            return self.finish(ScenarioId::DuplicateGuard, runs, &context, ScenarioMetrics::default(), checks);
        };

        // Shorter than regulation: a finished fixture would legitimately come back
        let mut started = 0;
        for _ in 0..(DEFAULT_REGULATION_MINUTES / 2) {
            if let Err(e) = simulator.synchronize().await {
                checks.fail(format!("synchronize failed: {e}"));
            }
            started += simulator.simulate().await;
            context.run_for(MINUTE).await;
        }

        checks.ensure(started == runs, || format!("started {started} simulations for {runs} fixtures"));
        checks.ensure(simulator.active_count() == runs, || {
            format!("{} active simulations for {runs} fixtures", simulator.active_count())
        });
        for id in &ids {
            let kickoffs = store
                .applied_updates(*id)
                .iter()
                .filter(|u| u.status == FixtureStatus::Live && u.home_team_score == 0 && u.away_team_score == 0)
                .count();
            checks.ensure(kickoffs == 1, || format!("fixture {id} kicked off {kickoffs} times"));
        }

        let metrics = ScenarioMetrics::collect(&store, started as u64);
        checks.common(&metrics);

        self.finish(ScenarioId::DuplicateGuard, runs, &context, metrics, checks)
    }

    /// MD-006: FlakyStore - two failed fetches, one failed roster lookup and
    /// two failed pushes.
    ///
    /// **Assertion**: fixtures are discovered on the first successful resync,
    /// the fixture whose roster failed starts on a later scan, pushes succeed
    /// on retry, every fixture finishes.
    async fn run_flaky_store(&self, runs: usize) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let store = Arc::new(InMemoryStore::new());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut checks = Checks::default();

        for i in 1..=runs as u64 {
            let (home, away) = (TeamId(2 * i - 1), TeamId(2 * i));
            store.set_roster(home, random_roster(&mut rng, home));
            store.set_roster(away, random_roster(&mut rng, away));
            store.insert_fixture(fixture(i, context.epoch() + to_chrono(MINUTE * 5), home, away));
        }
        store.fail_next_fetches(2);
        store.fail_next_rosters(1);
        store.fail_next_updates(2);

        let config = SimulatorConfig::default();
        let Some(mut simulator) = build_simulator(&context, &store, config.clone(), &mut checks) else {
            return self.finish(ScenarioId::FlakyStore, runs, &context, ScenarioMetrics::default(), checks);
        };

        let (stop, shutdown) = watch::channel(false);
        let driver = async {
            context.run_for(config.sync_interval * 2 + MINUTE * 60).await;
            let _ = stop.send(true);
        };
        tokio::join!(simulator.start(shutdown), driver);

        let metrics = ScenarioMetrics::collect(&store, runs as u64);
        checks.common(&metrics);
        checks.ensure(store.fetch_calls() >= 3, || format!("only {} fetches", store.fetch_calls()));
        checks.ensure(metrics.updates_failed == 2, || {
            format!("{} injected update failures observed", metrics.updates_failed)
        });
        checks.ensure(metrics.fixtures_finished == runs as u64, || {
            format!("{}/{runs} fixtures finished", metrics.fixtures_finished)
        });

        self.finish(ScenarioId::FlakyStore, runs, &context, metrics, checks)
    }

    /// MD-007: MatchDay - staggered kick-offs, the first few missed.
    ///
    /// **Assertion**: every fixture finishes without a draw, live fixtures
    /// report `live 0-0` first and `finished` last with scores never going
    /// down, the store ends on the last update.
    async fn run_match_day(&self, runs: usize) -> ScenarioResult {
        let context = SimContext::shared(self.seed);
        let store = Arc::new(InMemoryStore::new());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut checks = Checks::default();

        let ids: Vec<FixtureId> = (1..=runs as u64).map(FixtureId).collect();
        for id in &ids {
            let (home, away) = (TeamId(2 * id.0 - 1), TeamId(2 * id.0));
            store.set_roster(home, random_roster(&mut rng, home));
            store.set_roster(away, random_roster(&mut rng, away));
            let kickoff = context.epoch() + to_chrono(MINUTE * (10 * (id.0 as u32 - 1)));
            store.insert_fixture(fixture(id.0, kickoff, home, away));
        }

        // Come online after the first three kick-offs
        let online_at = MINUTE * 25;
        context.advance_time(online_at);
        let online = context.system_time();

        let Some(mut simulator) = build_simulator(&context, &store, SimulatorConfig::default(), &mut checks) else {
            return self.finish(ScenarioId::MatchDay, runs, &context, ScenarioMetrics::default(), checks);
        };

        let (stop, shutdown) = watch::channel(false);
        let driver = async {
            context.run_for(MINUTE * (10 * runs as u32 + 60)).await;
            let _ = stop.send(true);
        };
        tokio::join!(simulator.start(shutdown), driver);

        for id in &ids {
            let Some(stored) = store.fixture(*id) else {
                continue;
            };
            let updates = store.applied_updates(*id);
            let recovered = stored.scheduled_at < online;

            match (updates.first(), updates.last()) {
                (Some(first), Some(last)) => {
                    if !recovered {
                        checks.ensure(
                            first.status == FixtureStatus::Live && first.home_team_score == 0 && first.away_team_score == 0,
                            || format!("fixture {id} opened with {first:?}"),
                        );
                    } else {
                        checks.ensure(updates.len() == 1, || format!("recovered fixture {id} sent {} updates", updates.len()));
                    }
                    checks.ensure(last.status == FixtureStatus::Finished, || format!("fixture {id} ended on {last:?}"));
                    checks.ensure(
                        (stored.home.score, stored.away.score) == (last.home_team_score, last.away_team_score),
                        || format!("fixture {id} stored score differs from last update"),
                    );
                }
                _ => checks.fail(format!("fixture {id} never reported")),
            }

            let monotonic = updates.windows(2).all(|w| {
                w[1].home_team_score >= w[0].home_team_score && w[1].away_team_score >= w[0].away_team_score
            });
            checks.ensure(monotonic, || format!("fixture {id} score went down"));
        }

        let metrics = ScenarioMetrics::collect(&store, runs as u64);
        checks.common(&metrics);
        checks.ensure(metrics.fixtures_finished == runs as u64, || {
            format!("{}/{runs} fixtures finished", metrics.fixtures_finished)
        });

        self.finish(ScenarioId::MatchDay, runs, &context, metrics, checks)
    }

    fn finish(
        &self,
        scenario: ScenarioId,
        runs: usize,
        context: &SimContext,
        metrics: ScenarioMetrics,
        checks: Checks,
    ) -> ScenarioResult {
        let passed = checks.failures.is_empty();

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            runs,
            virtual_minutes: context.now().as_secs() / 60,
            failure_reason: if passed { None } else { Some(checks.failures.join("; ")) },
            metrics,
        }
    }
}

fn build_simulator(
    context: &Arc<SimContext>,
    store: &Arc<InMemoryStore>,
    config: SimulatorConfig,
    checks: &mut Checks,
) -> Option<Simulator<SimContext, InMemoryStore>> {
    match Simulator::new(Arc::clone(context), Arc::clone(store), config) {
        Ok(simulator) => Some(simulator),
        Err(e) => {
            checks.fail(format!("simulator rejected config: {e}"));
            None
        }
    }
}

fn fixture(id: u64, kickoff: DateTime<Utc>, home: TeamId, away: TeamId) -> Fixture {
    Fixture::scheduled(FixtureId(id), 1, kickoff, home, away)
}

/// `size` players of identical power.
fn flat_roster(team: TeamId, size: usize, power: u32) -> Vec<Player> {
    (0..size as u64)
        .map(|i| Player {
            team_id: Some(team),
            ..Player::with_power(team.0 * 100 + i, power)
        })
        .collect()
}

/// Eleven players with power drawn from the store's 40-60 range.
fn random_roster(rng: &mut ChaCha8Rng, team: TeamId) -> Vec<Player> {
    (0..11u64)
        .map(|i| Player {
            team_id: Some(team),
            ..Player::with_power(team.0 * 100 + i, rng.gen_range(40..=60))
        })
        .collect()
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
