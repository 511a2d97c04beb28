//! In-memory stand-ins for the market data provider, the store and the clock.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::checkpoint::clock::{Clock, Sleeper};
use crate::checkpoint::state::{PickState, WeeklyPickState};
use crate::db::models::batches::{BatchStatus, CreatedBatch, NewBatchModel};
use crate::db::models::checkpoints::{CheckpointStatus, NewCheckpointModel};
use crate::db::models::picks::NewPickModel;
use crate::db::store::{CheckpointStore, StoreError};
use crate::market_data::{FetchError, MarketDataProvider, Quote};
use crate::picks::PickAction;

/// Batch on 2026-01-05 benchmarked on SPY at 100 with AAPL 50, MSFT 200 and NVDA 25.
pub fn sample_state() -> WeeklyPickState {
    let pick = |ticker: &str, action, initial_price: &str| PickState {
        pick_id: Uuid::new_v4(),
        ticker: ticker.to_string(),
        action,
        reasoning: format!("{} thesis", ticker),
        initial_price: initial_price.to_string(),
    };
    WeeklyPickState {
        batch_id: Uuid::new_v4(),
        run_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
        benchmark_symbol: "SPY".to_string(),
        benchmark_initial_price: "100".to_string(),
        picks: vec![
            pick("AAPL", PickAction::Buy, "50"),
            pick("MSFT", PickAction::Sell, "200"),
            pick("NVDA", PickAction::Buy, "25"),
        ],
    }
}

/// Fixed quotes per symbol, with optional queued failures served first.
/// Unknown symbols answer with a blank quote.
#[derive(Default)]
pub struct ScriptedProvider {
    quotes: HashMap<String, Quote>,
    failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    latency: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quotes.insert(quote.symbol.clone(), quote);
        self
    }

    pub fn with_failures(self, symbol: &str, failures: Vec<FetchError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .extend(failures);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|s| *s == symbol).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn fetch_previous_close(&self, symbol: &str) -> Result<Quote, FetchError> {
        self.calls.lock().unwrap().push(symbol.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(|queue| queue.pop_front());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match failure {
            Some(err) => Err(err),
            None => Ok(self
                .quotes
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| Quote::new(symbol, "", ""))),
        }
    }
}

#[derive(Default)]
struct StoreState {
    batches: HashMap<Uuid, NaiveDate>,
    picks: HashMap<Uuid, HashSet<Uuid>>,
    checkpoints: Vec<(Uuid, NewCheckpointModel)>,
    created_batches: Vec<NewBatchModel>,
    progress: HashMap<Uuid, u32>,
    saved_progress: Vec<u32>,
    status_updates: Vec<(Uuid, BatchStatus)>,
}

/// Applies the same conflict and shape rules as the Postgres store.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds the batch and picks of `state`.
    pub fn with_state(state: &WeeklyPickState) -> Self {
        let store = Self::new();
        {
            let mut inner = store.state.lock().unwrap();
            inner.batches.insert(state.batch_id, state.run_date);
            inner
                .picks
                .insert(state.batch_id, state.picks.iter().map(|p| p.pick_id).collect());
        }
        store
    }

    pub fn with_progress(self, batch_id: Uuid, next_day: u32) -> Self {
        self.state.lock().unwrap().progress.insert(batch_id, next_day);
        self
    }

    pub fn checkpoints(&self) -> Vec<NewCheckpointModel> {
        self.state.lock().unwrap().checkpoints.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn checkpoint_ids(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().checkpoints.iter().map(|(id, _)| *id).collect()
    }

    pub fn created_batches(&self) -> Vec<NewBatchModel> {
        self.state.lock().unwrap().created_batches.clone()
    }

    pub fn saved_progress(&self) -> Vec<u32> {
        self.state.lock().unwrap().saved_progress.clone()
    }

    pub fn status_updates(&self) -> Vec<(Uuid, BatchStatus)> {
        self.state.lock().unwrap().status_updates.clone()
    }
}

fn insert_checkpoint(inner: &mut StoreState, checkpoint: &NewCheckpointModel) -> Result<Uuid, StoreError> {
    let conflict = inner
        .checkpoints
        .iter()
        .any(|(_, c)| c.batch_id == checkpoint.batch_id && c.checkpoint_date == checkpoint.checkpoint_date);
    if conflict {
        return Err(StoreError::CheckpointConflict {
            batch_id: checkpoint.batch_id,
            checkpoint_date: checkpoint.checkpoint_date,
        });
    }
    let id = Uuid::new_v4();
    inner.checkpoints.push((id, checkpoint.clone()));
    Ok(id)
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn create_batch(
        &self,
        batch: &NewBatchModel,
        picks: &[NewPickModel],
        initial_checkpoint: &NewCheckpointModel,
    ) -> Result<CreatedBatch, StoreError> {
        initial_checkpoint.validate().map_err(StoreError::InvalidCheckpoint)?;
        let mut inner = self.state.lock().unwrap();
        if inner.batches.values().any(|run_date| *run_date == batch.run_date) {
            return Err(StoreError::RunDateConflict { run_date: batch.run_date });
        }
        inner.batches.insert(batch.id, batch.run_date);
        inner.picks.insert(batch.id, picks.iter().map(|p| p.id).collect());
        inner.created_batches.push(batch.clone());
        let checkpoint_id = insert_checkpoint(&mut inner, initial_checkpoint)?;
        Ok(CreatedBatch {
            batch_id: batch.id,
            pick_ids: picks.iter().map(|p| p.id).collect(),
            checkpoint_id,
        })
    }

    async fn create_checkpoint(&self, checkpoint: &NewCheckpointModel) -> Result<Uuid, StoreError> {
        checkpoint.validate().map_err(StoreError::InvalidCheckpoint)?;
        let mut inner = self.state.lock().unwrap();
        let pick_ids = inner
            .picks
            .get(&checkpoint.batch_id)
            .cloned()
            .ok_or(StoreError::BatchNotFound(checkpoint.batch_id))?;
        if checkpoint.status == CheckpointStatus::Computed {
            let metric_ids: HashSet<Uuid> = checkpoint.metrics.iter().map(|m| m.pick_id).collect();
            if metric_ids != pick_ids {
                return Err(StoreError::InvalidCheckpoint("metrics do not cover the batch picks".to_string()));
            }
        }
        insert_checkpoint(&mut inner, checkpoint)
    }

    async fn update_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError> {
        let mut inner = self.state.lock().unwrap();
        if !inner.batches.contains_key(&batch_id) {
            return Err(StoreError::BatchNotFound(batch_id));
        }
        inner.status_updates.push((batch_id, status));
        Ok(())
    }

    async fn load_loop_progress(&self, batch_id: Uuid) -> Result<Option<u32>, StoreError> {
        Ok(self.state.lock().unwrap().progress.get(&batch_id).copied())
    }

    async fn save_loop_progress(&self, state: &WeeklyPickState, next_day: u32) -> Result<(), StoreError> {
        let mut inner = self.state.lock().unwrap();
        inner.progress.insert(state.batch_id, next_day);
        inner.saved_progress.push(next_day);
        Ok(())
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Records each requested sleep and moves the manual clock forward by it.
pub struct RecordingSleeper {
    clock: Arc<ManualClock>,
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.clock.advance(duration);
        tokio::task::yield_now().await;
    }
}
