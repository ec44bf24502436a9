//! Update publisher - delivers fixture state to the match store.
//!
//! Simulation hooks are synchronous, store calls are not. Hooks push
//! [`FixtureUpdate`]s into an unbounded FIFO; a single publisher task drains
//! it, so updates for one fixture reach the store in the order they happened
//! (live, goals, finished). Retryable failures are retried with exponential
//! backoff; anything still failing is logged and dropped.

use matchday_env::{FixtureUpdate, MatchStore, SimulatorContext, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sending half of the update queue, handed to simulation hooks.
pub type UpdateSender = mpsc::UnboundedSender<FixtureUpdate>;

/// Receiving half of the update queue, drained by [`UpdatePublisher::run`].
pub type UpdateReceiver = mpsc::UnboundedReceiver<FixtureUpdate>;

/// Creates a new update queue.
pub fn update_queue() -> (UpdateSender, UpdateReceiver) {
    mpsc::unbounded_channel()
}

/// Pushes fixture updates to the store with retry and backoff.
pub struct UpdatePublisher<Ctx, S> {
    context: Arc<Ctx>,
    store: Arc<S>,
    max_attempts: u32,
    base_delay: Duration,
}

impl<Ctx, S> Clone for UpdatePublisher<Ctx, S> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            store: Arc::clone(&self.store),
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
        }
    }
}

impl<Ctx, S> UpdatePublisher<Ctx, S>
where
    Ctx: SimulatorContext,
    S: MatchStore,
{
    pub fn new(context: Arc<Ctx>, store: Arc<S>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            context,
            store,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delivers one update, retrying retryable failures.
    ///
    /// Attempt `n` (n ≥ 2) waits `base_delay × 2^(n−2)` first, saturating
    /// instead of overflowing on long retry budgets.
    pub async fn deliver(&self, update: &FixtureUpdate) -> Result<(), StoreError> {
        let mut attempt = 1;

        loop {
            match self.store.update_fixture(update).await {
                Ok(()) => {
                    debug!(
                        fixture_id = %update.fixture_id,
                        status = %update.status,
                        home = update.home_team_score,
                        away = update.away_team_score,
                        attempt,
                        "update delivered"
                    );
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                    let delay = self.base_delay.saturating_mul(factor);
                    warn!(
                        fixture_id = %update.fixture_id,
                        attempt,
                        ?delay,
                        error = %e,
                        "update failed, retrying"
                    );
                    self.context.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drains the queue until every sender is gone.
    pub async fn run(self, mut queue: UpdateReceiver) {
        while let Some(update) = queue.recv().await {
            if let Err(e) = self.deliver(&update).await {
                warn!(
                    fixture_id = %update.fixture_id,
                    status = %update.status,
                    error = %e,
                    "dropping update"
                );
            }
        }
        debug!("update queue closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use matchday_env::{Fixture, FixtureId, FixtureStatus, Player, TeamId, TokioContext};
    use std::sync::Mutex;

    /// Store that fails the first `failures` updates with `error`.
    struct FlakyStore {
        failures: Mutex<u32>,
        error: fn() -> StoreError,
        calls: Mutex<Vec<FixtureUpdate>>,
    }

    impl FlakyStore {
        fn new(failures: u32, error: fn() -> StoreError) -> Self {
            Self {
                failures: Mutex::new(failures),
                error,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MatchStore for FlakyStore {
        async fn list_fixtures(&self) -> Result<Vec<Fixture>, StoreError> {
            Ok(Vec::new())
        }

        async fn list_roster(&self, _team: TeamId) -> Result<Vec<Player>, StoreError> {
            Ok(Vec::new())
        }

        async fn update_fixture(&self, update: &FixtureUpdate) -> Result<(), StoreError> {
            self.calls.lock().unwrap().push(update.clone());
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err((self.error)());
            }
            Ok(())
        }
    }

    fn update(id: u64) -> FixtureUpdate {
        FixtureUpdate::new(FixtureId(id), FixtureStatus::Live, 1, 0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_with_backoff() {
        let store = Arc::new(FlakyStore::new(2, || StoreError::transport("reset")));
        let publisher = UpdatePublisher::new(
            TokioContext::shared(),
            Arc::clone(&store),
            3,
            Duration::from_millis(500),
        );

        let started = tokio::time::Instant::now();
        publisher.deliver(&update(1)).await.unwrap();

        assert_eq!(store.calls.lock().unwrap().len(), 3);
        // 500ms + 1000ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let store = Arc::new(FlakyStore::new(10, || StoreError::unavailable("down")));
        let publisher = UpdatePublisher::new(
            TokioContext::shared(),
            Arc::clone(&store),
            3,
            Duration::from_millis(10),
        );

        assert!(publisher.deliver(&update(1)).await.is_err());
        assert_eq!(store.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_saturates_for_long_retry_budgets() {
        let store = Arc::new(FlakyStore::new(u32::MAX, || StoreError::transport("reset")));
        let publisher = UpdatePublisher::new(
            TokioContext::shared(),
            Arc::clone(&store),
            40,
            Duration::from_millis(1),
        );

        assert!(publisher.deliver(&update(1)).await.is_err());
        assert_eq!(store.calls.lock().unwrap().len(), 40);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let store = Arc::new(FlakyStore::new(1, || StoreError::Status {
            status: 404,
            body: "no such match".into(),
        }));
        let publisher = UpdatePublisher::new(
            TokioContext::shared(),
            Arc::clone(&store),
            5,
            Duration::from_millis(10),
        );

        assert!(publisher.deliver(&update(1)).await.is_err());
        assert_eq!(store.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queue_preserves_order() {
        let store = Arc::new(FlakyStore::new(0, || StoreError::transport("unused")));
        let publisher = UpdatePublisher::new(
            TokioContext::shared(),
            Arc::clone(&store),
            1,
            Duration::ZERO,
        );
        let (tx, rx) = update_queue();

        for id in 1..=5 {
            tx.send(update(id)).unwrap();
        }
        drop(tx);
        publisher.run(rx).await;

        let ids: Vec<u64> = store.calls.lock().unwrap().iter().map(|u| u.fixture_id.0).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }
}
