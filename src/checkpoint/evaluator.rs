use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::calendar::{parse_trading_day, previous_trading_day_fallback};
use super::error::CheckpointError;
use super::state::WeeklyPickState;
use crate::db::models::checkpoints::NewCheckpointModel;
use crate::db::models::pick_checkpoint_metrics::NewPickCheckpointMetricModel;
use crate::db::store::{CheckpointStore, StoreError};
use crate::market_data::Quote;
use crate::market_data::fan_out::{DailySnapshot, QuoteFetcher};
use crate::return_calculation_utils::{parse_positive_decimal, return_pct, subtract};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BenchmarkClosed,
    PickClosed { ticker: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Computed { checkpoint_id: Uuid, checkpoint_date: NaiveDate },
    Skipped { checkpoint_id: Uuid, checkpoint_date: NaiveDate, reason: SkipReason },
    /// A checkpoint for this (batch, date) was stored by an earlier attempt.
    AlreadyRecorded { checkpoint_date: NaiveDate },
}

impl CycleOutcome {
    pub fn checkpoint_date(&self) -> NaiveDate {
        match self {
            CycleOutcome::Computed { checkpoint_date, .. }
            | CycleOutcome::Skipped { checkpoint_date, .. }
            | CycleOutcome::AlreadyRecorded { checkpoint_date } => *checkpoint_date,
        }
    }
}

/// One day's cycle: fetch quotes, classify, compute, persist.
pub struct CheckpointEvaluator {
    fetcher: Arc<QuoteFetcher>,
    store: Arc<dyn CheckpointStore>,
    home_timezone: Tz,
}

impl CheckpointEvaluator {
    pub fn new(fetcher: Arc<QuoteFetcher>, store: Arc<dyn CheckpointStore>, home_timezone: Tz) -> Self {
        Self {
            fetcher,
            store,
            home_timezone,
        }
    }

    #[instrument(skip(self, state), fields(batch_id = %state.batch_id, on_close = true))]
    pub async fn run_daily_checkpoint(
        &self,
        state: &WeeklyPickState,
        scheduled_at: DateTime<Utc>,
    ) -> Result<CycleOutcome, CheckpointError> {
        let snapshot = self
            .fetcher
            .fetch_daily_snapshot(&state.benchmark_symbol, &state.tickers(), parse_trading_day)
            .await?;

        let (benchmark, checkpoint_date, pick_quotes) = match snapshot {
            DailySnapshot::BenchmarkClosed { .. } => {
                let checkpoint_date = previous_trading_day_fallback(scheduled_at, self.home_timezone);
                info!(%checkpoint_date, "Benchmark has no previous close, recording skipped checkpoint");
                return self
                    .persist_skipped(state, checkpoint_date, SkipReason::BenchmarkClosed)
                    .await;
            }
            DailySnapshot::Quotes {
                benchmark,
                benchmark_day,
                picks,
            } => (benchmark, benchmark_day, picks),
        };

        let quotes = pick_quotes_in_order(state, &pick_quotes)?;
        if let Some(closed) = quotes.iter().find(|q| !q.has_previous_close()) {
            info!(%checkpoint_date, ticker = %closed.symbol, "Pick has no previous close, recording skipped checkpoint");
            let reason = SkipReason::PickClosed {
                ticker: closed.symbol.clone(),
            };
            return self.persist_skipped(state, checkpoint_date, reason).await;
        }

        let checkpoint = compute_checkpoint(state, checkpoint_date, &benchmark, &quotes)?;
        match self.store.create_checkpoint(&checkpoint).await {
            Ok(checkpoint_id) => {
                info!(%checkpoint_id, %checkpoint_date, "Computed checkpoint recorded");
                Ok(CycleOutcome::Computed {
                    checkpoint_id,
                    checkpoint_date,
                })
            }
            Err(StoreError::CheckpointConflict { .. }) => already_recorded(checkpoint_date),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist_skipped(
        &self,
        state: &WeeklyPickState,
        checkpoint_date: NaiveDate,
        reason: SkipReason,
    ) -> Result<CycleOutcome, CheckpointError> {
        let checkpoint = NewCheckpointModel::skipped(state.batch_id, checkpoint_date);
        match self.store.create_checkpoint(&checkpoint).await {
            Ok(checkpoint_id) => Ok(CycleOutcome::Skipped {
                checkpoint_id,
                checkpoint_date,
                reason,
            }),
            Err(StoreError::CheckpointConflict { .. }) => already_recorded(checkpoint_date),
            Err(e) => Err(e.into()),
        }
    }
}

fn already_recorded(checkpoint_date: NaiveDate) -> Result<CycleOutcome, CheckpointError> {
    warn!(%checkpoint_date, "Checkpoint already recorded, treating as done");
    Ok(CycleOutcome::AlreadyRecorded { checkpoint_date })
}

fn pick_quotes_in_order<'a>(
    state: &WeeklyPickState,
    quotes: &'a HashMap<String, Quote>,
) -> Result<Vec<&'a Quote>, CheckpointError> {
    state
        .picks
        .iter()
        .map(|pick| {
            quotes
                .get(pick.ticker.trim())
                .ok_or_else(|| CheckpointError::MissingPickQuote {
                    ticker: pick.ticker.clone(),
                })
        })
        .collect()
}

/// Benchmark return plus each pick's absolute and relative return. Any bad
/// price fails the whole checkpoint.
fn compute_checkpoint(
    state: &WeeklyPickState,
    checkpoint_date: NaiveDate,
    benchmark: &Quote,
    pick_quotes: &[&Quote],
) -> Result<NewCheckpointModel, CheckpointError> {
    let benchmark_close = benchmark.previous_close().unwrap_or_default();
    let benchmark_price = parse_positive_decimal(benchmark_close, "benchmark price")?;
    let benchmark_return = return_pct(&state.benchmark_initial_price, benchmark_close)?;

    let mut metrics = Vec::with_capacity(state.picks.len());
    for (pick, quote) in state.picks.iter().zip(pick_quotes) {
        let close = quote.previous_close().unwrap_or_default();
        let absolute_return = return_pct(&pick.initial_price, close)?;
        metrics.push(NewPickCheckpointMetricModel {
            pick_id: pick.pick_id,
            current_price: parse_positive_decimal(close, "pick price")?,
            absolute_return_pct: absolute_return,
            vs_benchmark_pct: subtract(absolute_return, benchmark_return)?,
        });
    }

    Ok(NewCheckpointModel::computed(
        state.batch_id,
        checkpoint_date,
        benchmark_price,
        benchmark_return,
        metrics,
    ))
}
