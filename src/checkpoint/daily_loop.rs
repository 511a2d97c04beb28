use chrono_tz::Tz;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::calendar::daily_targets;
use super::clock::{Clock, Sleeper, sleep_until};
use super::error::CheckpointError;
use super::evaluator::{CheckpointEvaluator, CycleOutcome};
use super::state::WeeklyPickState;
use crate::db::models::batches::BatchStatus;
use crate::db::store::CheckpointStore;

/// Length of the observation window, one checkpoint per calendar day.
pub const DAILY_CHECKPOINT_DAYS: u32 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    pub batch_id: Uuid,
    /// First day run by this invocation; non-zero after a restart.
    pub resumed_from: u32,
    pub outcomes: Vec<CycleOutcome>,
}

/// Drives a batch through its daily checkpoints and completes it.
pub struct DailyCheckpointLoop {
    evaluator: Arc<CheckpointEvaluator>,
    store: Arc<dyn CheckpointStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    home_timezone: Tz,
    cancel: CancellationToken,
}

impl DailyCheckpointLoop {
    pub fn new(
        evaluator: Arc<CheckpointEvaluator>,
        store: Arc<dyn CheckpointStore>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        home_timezone: Tz,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            evaluator,
            store,
            clock,
            sleeper,
            home_timezone,
            cancel,
        }
    }

    /// Run the remaining days, then mark the batch completed. Progress is
    /// stored after every cycle so a restarted worker picks up at the first
    /// unfinished day. Targets already in the past run immediately.
    #[instrument(skip(self, state), fields(batch_id = %state.batch_id, run_date = %state.run_date, on_close = true))]
    pub async fn run(&self, state: &WeeklyPickState) -> Result<LoopSummary, CheckpointError> {
        let resumed_from = self
            .store
            .load_loop_progress(state.batch_id)
            .await?
            .unwrap_or(0)
            .min(DAILY_CHECKPOINT_DAYS);
        if resumed_from > 0 {
            info!(resumed_from, "Resuming checkpoint loop");
        }
        self.store.save_loop_progress(state, resumed_from).await?;

        let targets = daily_targets(state.run_date, DAILY_CHECKPOINT_DAYS, self.home_timezone)?;
        let mut outcomes = Vec::with_capacity(targets.len());

        for (day, target) in targets.into_iter().enumerate().skip(resumed_from as usize) {
            let day = day as u32;
            sleep_until(self.clock.as_ref(), self.sleeper.as_ref(), target, &self.cancel).await?;

            let outcome = self.evaluator.run_daily_checkpoint(state, target).await?;
            info!(day, %target, checkpoint_date = %outcome.checkpoint_date(), ?outcome, "Daily checkpoint cycle finished");
            outcomes.push(outcome);

            self.store.save_loop_progress(state, day + 1).await?;
        }

        self.store
            .update_batch_status(state.batch_id, BatchStatus::Completed)
            .await?;
        info!(cycles = outcomes.len(), "Checkpoint loop completed");

        Ok(LoopSummary {
            batch_id: state.batch_id,
            resumed_from,
            outcomes,
        })
    }

    /// [`run`](Self::run), marking the batch failed on any error other than cancellation.
    pub async fn run_to_completion(&self, state: &WeeklyPickState) -> Result<LoopSummary, CheckpointError> {
        match self.run(state).await {
            Ok(summary) => Ok(summary),
            Err(e) if e.is_cancelled() => {
                warn!(batch_id = %state.batch_id, "Checkpoint loop cancelled, batch left active for resume");
                Err(e)
            }
            Err(e) => {
                error!(batch_id = %state.batch_id, error = %e, "Checkpoint loop failed");
                if let Err(status_err) = self.store.update_batch_status(state.batch_id, BatchStatus::Failed).await {
                    error!(batch_id = %state.batch_id, error = %status_err, "Failed to mark batch as failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::calendar::previous_trading_day_fallback;
    use crate::market_data::fan_out::QuoteFetcher;
    use crate::market_data::{FetchError, MarketDataProvider, Quote};
    use crate::retry::RetryPolicy;
    use crate::test_support::{InMemoryStore, ManualClock, RecordingSleeper, ScriptedProvider, sample_state};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use chrono_tz::America::New_York;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        sleeper: Arc<RecordingSleeper>,
        cancel: CancellationToken,
        checkpoint_loop: DailyCheckpointLoop,
    }

    fn harness(provider: ScriptedProvider, store: InMemoryStore, now: DateTime<Utc>) -> Harness {
        let clock = Arc::new(ManualClock::new(now));
        build(Arc::new(provider), Arc::new(store), clock)
    }

    fn build(provider: Arc<dyn MarketDataProvider>, store: Arc<InMemoryStore>, clock: Arc<ManualClock>) -> Harness {
        let sleeper = Arc::new(RecordingSleeper::new(clock.clone()));
        let cancel = CancellationToken::new();
        let fetcher = QuoteFetcher::new(
            provider,
            RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, 0.0),
            cancel.clone(),
        );
        let evaluator = CheckpointEvaluator::new(Arc::new(fetcher), store.clone(), New_York);
        let checkpoint_loop = DailyCheckpointLoop::new(
            Arc::new(evaluator),
            store.clone(),
            clock.clone(),
            sleeper.clone(),
            New_York,
            cancel.clone(),
        );
        Harness {
            store,
            clock,
            sleeper,
            cancel,
            checkpoint_loop,
        }
    }

    fn sunday_evening() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 4, 23, 0, 0).unwrap()
    }

    fn weekday_market() -> ScriptedProvider {
        ScriptedProvider::new()
            .with_quote(Quote::new("SPY", "101", "2026-01-02"))
            .with_quote(Quote::new("AAPL", "51", "2026-01-02"))
            .with_quote(Quote::new("MSFT", "202", "2026-01-02"))
            .with_quote(Quote::new("NVDA", "26", "2026-01-02"))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Quotes the last completed weekday session relative to the clock's New York date.
    struct SessionProvider {
        clock: Arc<ManualClock>,
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for SessionProvider {
        async fn fetch_previous_close(&self, symbol: &str) -> Result<Quote, FetchError> {
            let session = previous_trading_day_fallback(self.clock.now(), New_York);
            let price = if symbol == "SPY" { "101" } else { "52" };
            Ok(Quote::new(symbol, price, &session.format("%Y-%m-%d").to_string()))
        }
    }

    #[tokio::test]
    async fn runs_fourteen_cycles_and_completes_once() {
        let state = sample_state();
        let clock = Arc::new(ManualClock::new(sunday_evening()));
        let provider = Arc::new(SessionProvider { clock: clock.clone() });
        let h = build(provider, Arc::new(InMemoryStore::with_state(&state)), clock);

        let summary = h.checkpoint_loop.run(&state).await.unwrap();

        assert_eq!(summary.resumed_from, 0);
        assert_eq!(summary.outcomes.len(), 14);
        assert_eq!(h.store.status_updates(), vec![(state.batch_id, BatchStatus::Completed)]);
        assert_eq!(h.store.saved_progress().last(), Some(&14));
        assert_eq!(h.clock.now(), Utc.with_ymd_and_hms(2026, 1, 18, 14, 0, 0).unwrap());

        // Day 0 records Friday's close, before the run date
        assert_eq!(summary.outcomes[0].checkpoint_date(), date(2026, 1, 2));
        let stored: Vec<NaiveDate> = h.store.checkpoints().iter().map(|c| c.checkpoint_date).collect();
        assert_eq!(
            stored,
            vec![
                date(2026, 1, 2),
                date(2026, 1, 5),
                date(2026, 1, 6),
                date(2026, 1, 7),
                date(2026, 1, 8),
                date(2026, 1, 9),
                date(2026, 1, 12),
                date(2026, 1, 13),
                date(2026, 1, 14),
                date(2026, 1, 15),
                date(2026, 1, 16),
            ]
        );
        // Sunday, Monday and the final Sunday see a session already recorded
        let repeats: Vec<usize> = summary
            .outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| matches!(o, CycleOutcome::AlreadyRecorded { .. }))
            .map(|(day, _)| day)
            .collect();
        assert_eq!(repeats, vec![6, 7, 13]);
    }

    #[tokio::test]
    async fn checkpoint_dates_follow_reported_trading_days() {
        let state = sample_state();
        let h = harness(weekday_market(), InMemoryStore::with_state(&state), sunday_evening());

        let summary = h.checkpoint_loop.run(&state).await.unwrap();

        // The provider always reports the same session, so only day 0 stores a row
        assert_eq!(summary.outcomes[0].checkpoint_date(), date(2026, 1, 2));
        assert!(matches!(summary.outcomes[0], CycleOutcome::Computed { .. }));
        assert!(summary.outcomes[1..]
            .iter()
            .all(|o| matches!(o, CycleOutcome::AlreadyRecorded { .. })));
        assert_eq!(h.store.checkpoints().len(), 1);
        assert_eq!(h.store.status_updates().len(), 1);
    }

    #[tokio::test]
    async fn sleeps_until_each_daily_target() {
        let state = sample_state();
        let h = harness(weekday_market(), InMemoryStore::with_state(&state), sunday_evening());

        h.checkpoint_loop.run(&state).await.unwrap();

        // Sunday 23:00 UTC to Monday 14:00 UTC is 15 hours, then 24 hours per day
        let total: Duration = h.sleeper.sleeps().iter().sum();
        assert_eq!(total, Duration::from_secs((15 + 13 * 24) * 3600));
    }

    #[tokio::test]
    async fn resumes_from_saved_progress_without_waiting_for_past_targets() {
        let state = sample_state();
        let store = InMemoryStore::with_state(&state).with_progress(state.batch_id, 10);
        // Restarted on day 12 at noon UTC, after the day 10 and 11 targets
        let now = Utc.with_ymd_and_hms(2026, 1, 17, 12, 0, 0).unwrap();
        let h = harness(weekday_market(), store, now);

        let summary = h.checkpoint_loop.run(&state).await.unwrap();

        assert_eq!(summary.resumed_from, 10);
        assert_eq!(summary.outcomes.len(), 4);
        // Days 10 and 11 ran at once; day 12 (01-17 14:00 UTC) waited two hours in hourly slices
        let sleeps = h.sleeper.sleeps();
        assert_eq!(sleeps[..2], [Duration::from_secs(3600), Duration::from_secs(3600)]);
        assert_eq!(sleeps[..2].iter().sum::<Duration>(), Duration::from_secs(2 * 3600));
        assert_eq!(h.store.status_updates(), vec![(state.batch_id, BatchStatus::Completed)]);
    }

    #[tokio::test]
    async fn finished_loop_only_completes_the_batch() {
        let state = sample_state();
        let store = InMemoryStore::with_state(&state).with_progress(state.batch_id, DAILY_CHECKPOINT_DAYS);
        let h = harness(weekday_market(), store, sunday_evening());

        let summary = h.checkpoint_loop.run(&state).await.unwrap();

        assert!(summary.outcomes.is_empty());
        assert!(h.store.checkpoints().is_empty());
        assert_eq!(h.store.status_updates(), vec![(state.batch_id, BatchStatus::Completed)]);
    }

    #[tokio::test]
    async fn failed_cycle_aborts_and_marks_batch_failed() {
        let state = sample_state();
        let provider = weekday_market().with_quote(Quote::new("SPY", "not-a-price", "2026-01-02"));
        let h = harness(provider, InMemoryStore::with_state(&state), sunday_evening());

        let err = h.checkpoint_loop.run_to_completion(&state).await.unwrap_err();

        assert!(matches!(err, CheckpointError::Arithmetic(_)));
        assert_eq!(h.store.status_updates(), vec![(state.batch_id, BatchStatus::Failed)]);
        assert_eq!(h.store.saved_progress(), vec![0]);
        assert!(h.store.checkpoints().is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_abort_the_loop() {
        let state = sample_state();
        let transient = || FetchError::Transport { symbol: "SPY".into(), message: "timeout".into() };
        let provider = weekday_market().with_failures("SPY", vec![transient(), transient(), transient()]);
        let h = harness(provider, InMemoryStore::with_state(&state), sunday_evening());

        let err = h.checkpoint_loop.run(&state).await.unwrap_err();

        assert!(matches!(err, CheckpointError::Fetch(FetchError::Transport { .. })));
        assert!(h.store.status_updates().is_empty(), "run leaves the status to the caller");
    }

    #[tokio::test]
    async fn cancellation_leaves_batch_active() {
        let state = sample_state();
        let h = harness(weekday_market(), InMemoryStore::with_state(&state), sunday_evening());
        h.cancel.cancel();

        let err = h.checkpoint_loop.run_to_completion(&state).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(h.store.status_updates().is_empty());
        assert_eq!(h.store.saved_progress(), vec![0]);
    }
}
