//! Simulation context implementing SimulatorContext for deterministic testing.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use matchday_env::{FixtureId, SimulatorContext};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::Instrument;

/// Polls given to spawned tasks before the clock is allowed to move.
const SETTLE_YIELDS: usize = 64;

/// Pending sleepers, ordered by wake time then registration order.
#[derive(Default)]
struct TimerQueue {
    next_seq: u64,

    queue: BinaryHeap<Reverse<(u64, u64)>>,

    wakers: HashMap<u64, oneshot::Sender<()>>,
}

/// Simulation context backed by a virtual clock and a seeded RNG.
///
/// This implements `SimulatorContext` using:
/// - A virtual wall clock that only moves when the harness advances it
/// - Sleeps that park until the clock reaches their wake time
/// - Per-fixture ChaCha8 streams derived from the master seed
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Sleepers waiting for the clock
    timers: Arc<Mutex<TimerQueue>>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: DateTime<Utc>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            timers: Arc::new(Mutex::new(TimerQueue::default())),
            epoch: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Wall-clock time that virtual time 0 maps to.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Returns the current virtual time since the epoch.
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap()
    }

    /// Advances virtual time by the given duration, waking every sleeper that is now due.
    pub fn advance_time(&self, duration: Duration) {
        let target = self.time_ns() + duration.as_nanos() as u64;
        self.set_time(target);
    }

    /// Sets the virtual time to a specific value, waking every sleeper that is now due.
    ///
    /// The clock never moves backwards.
    pub fn set_time(&self, time_ns: u64) {
        {
            let mut time = self.virtual_time_ns.lock().unwrap();
            *time = (*time).max(time_ns);
        }
        self.wake_due();
    }

    /// Wake time of the earliest pending sleeper.
    pub fn next_wake_ns(&self) -> Option<u64> {
        self.timers.lock().unwrap().queue.peek().map(|Reverse((at, _))| *at)
    }

    /// Number of tasks parked on the clock.
    pub fn pending_timers(&self) -> usize {
        self.timers.lock().unwrap().wakers.len()
    }

    /// Lets every runnable task make progress without moving the clock.
    pub async fn settle(&self) {
        for _ in 0..SETTLE_YIELDS {
            tokio::task::yield_now().await;
        }
    }

    /// Drives the simulation for `duration` of virtual time.
    ///
    /// Alternates between letting tasks run and jumping the clock to the next
    /// wake time, so sleepers fire in order. Ends with the clock exactly at
    /// the deadline.
    pub async fn run_for(&self, duration: Duration) {
        let deadline = self.time_ns() + duration.as_nanos() as u64;

        loop {
            self.settle().await;
            match self.next_wake_ns() {
                Some(at) if at <= deadline => self.set_time(at),
                _ => break,
            }
        }

        self.set_time(deadline);
        self.settle().await;
    }

    fn wake_due(&self) {
        let now = self.time_ns();
        let mut timers = self.timers.lock().unwrap();

        while let Some(Reverse((at, seq))) = timers.queue.peek().copied() {
            if at > now {
                break;
            }
            timers.queue.pop();
            if let Some(waker) = timers.wakers.remove(&seq) {
                // Sleeper may have been cancelled
                let _ = waker.send(());
            }
        }
    }

    fn register_timer(&self, wake_ns: u64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut timers = self.timers.lock().unwrap();

        let seq = timers.next_seq;
        timers.next_seq += 1;
        timers.queue.push(Reverse((wake_ns, seq)));
        timers.wakers.insert(seq, tx);

        rx
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            timers: Arc::clone(&self.timers),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl SimulatorContext for SimContext {
    fn system_time(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::nanoseconds(self.time_ns() as i64);
        self.epoch + elapsed
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return;
        }

        let wake = self.register_timer(self.time_ns() + duration.as_nanos() as u64);
        // Dropped sender means the whole context is gone
        let _ = wake.await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("sim_task", name = %name, seed = self.seed);
        tokio::spawn(future.instrument(span));
    }

    fn fixture_rng(&self, fixture: FixtureId) -> ChaCha8Rng {
        // Combine master seed with the fixture id for an independent stream
        let combined_seed = self.seed.wrapping_mul(0x517cc1b727220a95) ^ fixture.0;
        ChaCha8Rng::seed_from_u64(combined_seed)
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);
        assert_eq!(ctx.system_time(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        ctx.advance_time(Duration::from_secs(90));
        assert_eq!(ctx.now(), Duration::from_secs(90));
        assert_eq!(ctx.system_time(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 30).unwrap());
    }

    #[test]
    fn test_clock_never_moves_backwards() {
        let ctx = SimContext::new(42);
        ctx.advance_time(Duration::from_secs(10));
        ctx.set_time(0);
        assert_eq!(ctx.now(), Duration::from_secs(10));
    }

    #[test]
    fn test_fixture_rng_is_deterministic() {
        let ctx1 = SimContext::new(42);
        let ctx2 = SimContext::new(42);

        let a: u64 = ctx1.fixture_rng(FixtureId(1)).gen();
        let b: u64 = ctx2.fixture_rng(FixtureId(1)).gen();
        assert_eq!(a, b);

        // Different fixture = different stream
        let c: u64 = ctx1.fixture_rng(FixtureId(2)).gen();
        assert_ne!(a, c);

        // Different seed = different stream
        let d: u64 = SimContext::new(43).fixture_rng(FixtureId(1)).gen();
        assert_ne!(a, d);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
    }

    #[tokio::test]
    async fn test_sleep_parks_until_clock_reaches_wake_time() {
        let ctx = SimContext::shared(7);
        let (tx, mut rx) = tokio::sync::oneshot::channel();

        let sleeper = Arc::clone(&ctx);
        ctx.spawn("sleeper", async move {
            sleeper.sleep(Duration::from_secs(60)).await;
            let _ = tx.send(sleeper.now());
        });

        ctx.settle().await;
        assert_eq!(ctx.pending_timers(), 1);

        ctx.advance_time(Duration::from_secs(59));
        ctx.settle().await;
        assert!(rx.try_recv().is_err());

        ctx.advance_time(Duration::from_secs(1));
        ctx.settle().await;
        assert_eq!(rx.try_recv().unwrap(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_run_for_fires_sleepers_in_order() {
        let ctx = SimContext::shared(7);
        let log = Arc::new(Mutex::new(Vec::new()));

        for (name, secs) in [("late", 30u64), ("early", 10), ("middle", 20)] {
            let sleeper = Arc::clone(&ctx);
            let log = Arc::clone(&log);
            ctx.spawn(name, async move {
                sleeper.sleep(Duration::from_secs(secs)).await;
                log.lock().unwrap().push((name, sleeper.now().as_secs()));
            });
        }

        ctx.run_for(Duration::from_secs(25)).await;

        assert_eq!(*log.lock().unwrap(), vec![("early", 10), ("middle", 20)]);
        assert_eq!(ctx.now(), Duration::from_secs(25));
        assert_eq!(ctx.pending_timers(), 1);
    }
}
