//! Fixture Simulation - tick-driven state machine for a single match.
//! ===================================================================
//!
//! Each tick is one virtual minute. Goals are rare random events biased by
//! the strength gap between the two rosters; when regulation time runs out a
//! level score is broken by awarding one goal to a random side.
//!
//! ```text
//!   Pending ──start()──► Live ──tick() × duration──► Finished
//!                          │                            │
//!                          └─ on_goal(snapshot)         └─ on_finish(snapshot), once
//! ```
//!
//! Two playback modes share the same tick:
//! - **Live**: one tick immediately, then one per `tick_interval` on a task
//!   spawned through the [`SimulatorContext`].
//! - **Fast**: all ticks in a tight synchronous loop, used to catch up
//!   fixtures whose kick-off passed while the process was down.

use crate::strength::{Strength, TeamStrength};
use matchday_env::{Fixture, FixtureId, FixtureStatus, SimulatorContext};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Regulation length in virtual minutes.
pub const DEFAULT_REGULATION_MINUTES: u32 = 40;

/// Chance that any given minute produces a goal.
pub const GOAL_PROBABILITY: f64 = 0.05;

/// Strength gap at which the bias reaches its nominal maximum.
const MAX_STRENGTH_DIFF: f64 = 160.0;

/// How far the stronger side's share moves away from 0.5 at `MAX_STRENGTH_DIFF`.
const STRENGTH_BIAS_SPAN: f64 = 0.2;

/// Per-goal luck multiplier range.
const LUCK_MIN: f64 = 0.7;
const LUCK_MAX: f64 = 1.3;

// =============================================================================
// TYPES
// =============================================================================

/// How ticks are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// One tick per wall-clock interval
    Live,
    /// All ticks synchronously, no delay
    Fast,
}

/// Lifecycle of a simulation. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationPhase {
    Pending,
    Live,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Home,
    Away,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Simulation is not live; nothing happened
    Idle,
    /// A minute passed without a goal
    Quiet,
    /// A minute passed and a side scored
    Goal(Side),
    /// Regulation time reached; the simulation is over
    Finished,
}

type GoalHook = Box<dyn FnMut(&Fixture) + Send>;
type FinishHook = Box<dyn FnOnce(Fixture) + Send>;

/// Notifications emitted by a simulation.
///
/// Hooks run after the simulation has committed its own state, so whatever
/// they do with the snapshot cannot corrupt the match.
pub struct SimulationHooks {
    on_goal: GoalHook,
    on_finish: Option<FinishHook>,
}

impl SimulationHooks {
    pub fn new(
        on_goal: impl FnMut(&Fixture) + Send + 'static,
        on_finish: impl FnOnce(Fixture) + Send + 'static,
    ) -> Self {
        Self {
            on_goal: Box::new(on_goal),
            on_finish: Some(Box::new(on_finish)),
        }
    }

    /// Only the terminal snapshot matters (fast-mode recovery).
    pub fn finish_only(on_finish: impl FnOnce(Fixture) + Send + 'static) -> Self {
        Self::new(|_| {}, on_finish)
    }

    /// No notifications at all.
    pub fn none() -> Self {
        Self::new(|_| {}, |_| {})
    }
}

impl std::fmt::Debug for SimulationHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationHooks")
            .field("finish_pending", &self.on_finish.is_some())
            .finish()
    }
}

/// Base probability that a goal goes to the home side.
///
/// `0.5 + diff / 160 * 0.2` for the stronger side, mirrored for the weaker.
/// Equal strengths give exactly 0.5.
pub fn home_goal_chance(home: Strength, away: Strength) -> f64 {
    let diff = home.abs_diff(away) as f64;
    let base = 0.5 + (diff / MAX_STRENGTH_DIFF) * STRENGTH_BIAS_SPAN;

    if home > away {
        base
    } else {
        1.0 - base
    }
}

// =============================================================================
// FIXTURE SIMULATION
// =============================================================================

/// Runtime state of one fixture being played out.
pub struct FixtureSimulation<R: Rng> {
    /// Fixture record as it was when the simulation was created
    fixture: Fixture,

    home_strength: Strength,
    away_strength: Strength,

    /// Regulation length in virtual minutes
    duration: u32,

    /// Virtual minutes played
    elapsed: u32,

    home_score: u32,
    away_score: u32,

    phase: SimulationPhase,

    rng: R,

    hooks: SimulationHooks,
}

impl<R: Rng> FixtureSimulation<R> {
    /// Creates a pending simulation. Strengths are sampled once, here.
    pub fn new(
        fixture: Fixture,
        home: &impl TeamStrength,
        away: &impl TeamStrength,
        duration: u32,
        rng: R,
        hooks: SimulationHooks,
    ) -> Self {
        Self {
            fixture,
            home_strength: home.strength(),
            away_strength: away.strength(),
            duration,
            elapsed: 0,
            home_score: 0,
            away_score: 0,
            phase: SimulationPhase::Pending,
            rng,
            hooks,
        }
    }

    pub fn id(&self) -> FixtureId {
        self.fixture.id
    }

    pub fn phase(&self) -> SimulationPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == SimulationPhase::Finished
    }

    pub fn elapsed_minutes(&self) -> u32 {
        self.elapsed
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    /// Returns `(home, away)` goals.
    pub fn score(&self) -> (u32, u32) {
        (self.home_score, self.away_score)
    }

    /// Returns `(home, away)` strengths.
    pub fn strengths(&self) -> (Strength, Strength) {
        (self.home_strength, self.away_strength)
    }

    /// Copy of the fixture with `status` and the current score.
    pub fn snapshot(&self, status: FixtureStatus) -> Fixture {
        self.fixture.snapshot(status, self.home_score, self.away_score)
    }

    /// Snapshot with the status matching the current phase.
    pub fn current_snapshot(&self) -> Fixture {
        let status = match self.phase {
            SimulationPhase::Pending => FixtureStatus::Scheduled,
            SimulationPhase::Live => FixtureStatus::Live,
            SimulationPhase::Finished => FixtureStatus::Finished,
        };
        self.snapshot(status)
    }

    /// Starts the simulation.
    ///
    /// Live mode executes the first tick immediately and leaves the rest to
    /// the caller's timer; fast mode runs to completion before returning.
    /// Returns `false` (and does nothing) if already started or finished.
    pub fn start(&mut self, mode: PlaybackMode) -> bool {
        if self.phase != SimulationPhase::Pending {
            return false;
        }

        self.phase = SimulationPhase::Live;

        match mode {
            PlaybackMode::Live => {
                self.tick();
            }
            PlaybackMode::Fast => {
                while !self.is_finished() {
                    self.tick();
                }
            }
        }

        true
    }

    /// Plays the whole fixture synchronously and returns the final snapshot.
    pub fn run_fast(mut self) -> Fixture {
        self.start(PlaybackMode::Fast);
        self.current_snapshot()
    }

    /// Advances one virtual minute.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != SimulationPhase::Live {
            return TickOutcome::Idle;
        }

        self.elapsed += 1;

        if self.elapsed < self.duration {
            if !self.rng.gen_bool(GOAL_PROBABILITY) {
                return TickOutcome::Quiet;
            }

            let side = self.resolve_goal();
            let snapshot = self.snapshot(FixtureStatus::Live);
            (self.hooks.on_goal)(&snapshot);
            return TickOutcome::Goal(side);
        }

        // No draws: a level score at full time gets a coin-flip winner.
        if self.home_score == self.away_score {
            let side = if self.rng.gen_bool(0.5) { Side::Home } else { Side::Away };
            self.award(side);
        }

        self.phase = SimulationPhase::Finished;

        debug!(
            fixture_id = %self.fixture.id,
            home = self.home_score,
            away = self.away_score,
            "full time"
        );

        let snapshot = self.snapshot(FixtureStatus::Finished);
        if let Some(on_finish) = self.hooks.on_finish.take() {
            on_finish(snapshot);
        }

        TickOutcome::Finished
    }

    /// Decides which side a goal goes to and records it.
    fn resolve_goal(&mut self) -> Side {
        let chance = home_goal_chance(self.home_strength, self.away_strength);
        let luck = self.rng.gen_range(LUCK_MIN..LUCK_MAX);
        let final_chance = chance * luck;

        let side = if self.rng.gen::<f64>() < final_chance {
            Side::Home
        } else {
            Side::Away
        };

        self.award(side);

        debug!(
            fixture_id = %self.fixture.id,
            minute = self.elapsed,
            ?side,
            home = self.home_score,
            away = self.away_score,
            "goal"
        );

        side
    }

    fn award(&mut self, side: Side) {
        match side {
            Side::Home => self.home_score += 1,
            Side::Away => self.away_score += 1,
        }
    }
}

impl<R: Rng + Send + 'static> FixtureSimulation<R> {
    /// Starts in live mode and hands the remaining ticks to a timer task.
    ///
    /// The first tick runs before this returns. The task ends itself at the
    /// terminal tick; nothing else stops it. Returns `false` if the
    /// simulation had already been started.
    pub fn spawn_live<Ctx: SimulatorContext>(mut self, ctx: Arc<Ctx>, tick_interval: Duration) -> bool {
        if !self.start(PlaybackMode::Live) {
            return false;
        }

        if self.is_finished() {
            return true;
        }

        let name = format!("fixture-{}", self.fixture.id.0);
        let timer = Arc::clone(&ctx);
        ctx.spawn(&name, async move {
            while !self.is_finished() {
                timer.sleep(tick_interval).await;
                self.tick();
            }
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use matchday_env::{TeamId, TokioContext};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Mutex;

    fn fixture(id: u64) -> Fixture {
        Fixture::scheduled(FixtureId(id), 1, Utc::now(), TeamId(1), TeamId(2))
    }

    fn sim(seed: u64, home: Strength, away: Strength, duration: u32) -> FixtureSimulation<ChaCha8Rng> {
        FixtureSimulation::new(
            fixture(seed),
            &home,
            &away,
            duration,
            ChaCha8Rng::seed_from_u64(seed),
            SimulationHooks::none(),
        )
    }

    fn home_win_rate(home: Strength, away: Strength, runs: u64) -> f64 {
        let wins = (0..runs)
            .map(|seed| sim(seed, home, away, DEFAULT_REGULATION_MINUTES).run_fast())
            .filter(|f| f.home.score > f.away.score)
            .count();
        wins as f64 / runs as f64
    }

    #[test]
    fn test_home_goal_chance() {
        assert!((home_goal_chance(300, 300) - 0.5).abs() < 1e-12);
        assert!((home_goal_chance(380, 300) - 0.6).abs() < 1e-12);
        assert!((home_goal_chance(300, 380) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_tick_before_start_is_idle() {
        let mut s = sim(1, 300, 300, 40);
        assert_eq!(s.tick(), TickOutcome::Idle);
        assert_eq!(s.elapsed_minutes(), 0);
        assert_eq!(s.phase(), SimulationPhase::Pending);
    }

    #[test]
    fn test_start_twice_is_noop() {
        let mut s = sim(1, 300, 300, 40);
        assert!(s.start(PlaybackMode::Live));
        assert_eq!(s.elapsed_minutes(), 1);

        assert!(!s.start(PlaybackMode::Fast));
        assert_eq!(s.elapsed_minutes(), 1);
        assert_eq!(s.phase(), SimulationPhase::Live);
    }

    #[test]
    fn test_fast_mode_runs_to_regulation() {
        let mut s = sim(7, 300, 300, 40);
        assert!(s.start(PlaybackMode::Fast));

        assert!(s.is_finished());
        assert_eq!(s.elapsed_minutes(), 40);
        assert_eq!(s.tick(), TickOutcome::Idle);
        assert!(!s.start(PlaybackMode::Live));

        let (home, away) = s.score();
        assert_ne!(home, away);
        assert_eq!(s.current_snapshot().status, FixtureStatus::Finished);
    }

    #[test]
    fn test_single_minute_regulation_finishes_on_first_tick() {
        let mut s = sim(3, 100, 200, 1);
        s.start(PlaybackMode::Live);

        assert!(s.is_finished());
        let (home, away) = s.score();
        assert_eq!(home + away, 1);
    }

    #[test]
    fn test_hooks_see_monotonic_scores_and_finish_once() {
        let goals = Arc::new(Mutex::new(Vec::new()));
        let finishes = Arc::new(Mutex::new(Vec::new()));

        let g = Arc::clone(&goals);
        let f = Arc::clone(&finishes);
        let hooks = SimulationHooks::new(
            move |snap| g.lock().unwrap().push((snap.status, snap.home.score, snap.away.score)),
            move |snap| f.lock().unwrap().push(snap),
        );

        // Generous regulation so several goals happen
        let s = FixtureSimulation::new(
            fixture(11),
            &250u32,
            &260u32,
            400,
            ChaCha8Rng::seed_from_u64(11),
            hooks,
        );
        let final_snapshot = s.run_fast();

        let goals = goals.lock().unwrap();
        assert!(!goals.is_empty());
        for pair in goals.windows(2) {
            assert!(pair[1].1 >= pair[0].1);
            assert!(pair[1].2 >= pair[0].2);
            assert_eq!(pair[1].1 + pair[1].2, pair[0].1 + pair[0].2 + 1);
        }
        assert!(goals.iter().all(|(status, _, _)| *status == FixtureStatus::Live));

        let finishes = finishes.lock().unwrap();
        assert_eq!(finishes.len(), 1);
        assert_eq!(finishes[0], final_snapshot);
        assert_eq!(finishes[0].status, FixtureStatus::Finished);
    }

    #[test]
    fn test_equal_strength_never_draws() {
        for seed in 0..100 {
            let result = sim(seed, 300, 300, DEFAULT_REGULATION_MINUTES).run_fast();
            assert!(!result.is_draw(), "seed {seed} drew {}-{}", result.home.score, result.away.score);
        }
    }

    #[test]
    fn test_stronger_home_side_wins_more_often() {
        let rate = home_win_rate(400, 100, 500);
        assert!(rate > 0.6, "home win rate {rate}");
    }

    #[test]
    fn test_win_rate_grows_with_strength_gap() {
        let even = home_win_rate(300, 300, 1000);
        let slight = home_win_rate(380, 300, 1000);
        let heavy = home_win_rate(600, 300, 1000);

        assert!(even < slight, "{even} !< {slight}");
        assert!(slight < heavy, "{slight} !< {heavy}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_mode_ticks_on_timer_until_finish() {
        let ctx = TokioContext::shared();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let s = FixtureSimulation::new(
            fixture(5),
            &300u32,
            &300u32,
            DEFAULT_REGULATION_MINUTES,
            ChaCha8Rng::seed_from_u64(5),
            SimulationHooks::finish_only(move |snap| {
                let _ = tx.send(snap);
            }),
        );

        let started = tokio::time::Instant::now();
        assert!(s.spawn_live(ctx, Duration::from_secs(60)));

        let result = rx.await.unwrap();
        assert_eq!(result.status, FixtureStatus::Finished);
        assert!(!result.is_draw());
        // First tick is immediate, the other 39 wait one interval each
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(39 * 60));
        assert!(waited < Duration::from_secs(40 * 60));
    }

    #[tokio::test]
    async fn test_live_mode_first_tick_is_immediate() {
        let ctx = TokioContext::shared();
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let s = FixtureSimulation::new(
            fixture(6),
            &300u32,
            &300u32,
            1,
            ChaCha8Rng::seed_from_u64(6),
            SimulationHooks::finish_only(move |snap| {
                let _ = tx.send(snap);
            }),
        );

        assert!(s.spawn_live(ctx, Duration::from_secs(3600)));
        assert!(rx.try_recv().is_ok());
    }

    proptest! {
        #[test]
        fn prop_fast_mode_never_draws(
            duration in 1u32..=120,
            home in 0u32..=1200,
            away in 0u32..=1200,
            seed in any::<u64>(),
        ) {
            let result = sim(seed, home, away, duration).run_fast();
            prop_assert_eq!(result.status, FixtureStatus::Finished);
            prop_assert_ne!(result.home.score, result.away.score);
        }
    }
}
