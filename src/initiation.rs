use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use eyre::{Result, WrapErr, eyre};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::checkpoint::calendar::parse_trading_day;
use crate::checkpoint::state::{PickState, WeeklyPickState};
use crate::db::models::batches::NewBatchModel;
use crate::db::models::checkpoints::NewCheckpointModel;
use crate::db::models::pick_checkpoint_metrics::NewPickCheckpointMetricModel;
use crate::db::models::picks::NewPickModel;
use crate::db::store::{CheckpointStore, StoreError};
use crate::market_data::fan_out::QuoteFetcher;
use crate::picks::{PickDrafter, validate_drafts};
use crate::return_calculation_utils::{parse_positive_decimal, return_pct};

/// Starts a weekly batch: picks, baseline prices, and the initial checkpoint.
pub struct WeeklyInitiator {
    drafter: Arc<dyn PickDrafter>,
    fetcher: Arc<QuoteFetcher>,
    store: Arc<dyn CheckpointStore>,
    benchmark_symbol: String,
    home_timezone: Tz,
}

impl WeeklyInitiator {
    pub fn new(
        drafter: Arc<dyn PickDrafter>,
        fetcher: Arc<QuoteFetcher>,
        store: Arc<dyn CheckpointStore>,
        benchmark_symbol: impl Into<String>,
        home_timezone: Tz,
    ) -> Self {
        Self {
            drafter,
            fetcher,
            store,
            benchmark_symbol: benchmark_symbol.into(),
            home_timezone,
        }
    }

    /// The run date is `now`'s calendar date in the home time zone; a second
    /// batch for the same date is refused.
    #[instrument(skip(self), fields(benchmark = %self.benchmark_symbol, on_close = true))]
    pub async fn initiate_weekly_batch(&self, now: DateTime<Utc>) -> Result<WeeklyPickState> {
        let run_date = now.with_timezone(&self.home_timezone).date_naive();

        let drafts = self.drafter.draft_picks().await.wrap_err("Failed to draft picks")?;
        validate_drafts(&drafts)?;
        let tickers: Vec<String> = drafts.iter().map(|d| d.ticker.trim().to_string()).collect();

        let quotes = self
            .fetcher
            .fetch_initial_snapshot(&self.benchmark_symbol, &tickers)
            .await
            .wrap_err("Failed to fetch baseline prices")?;

        let benchmark_quote = quotes
            .get(self.benchmark_symbol.trim())
            .ok_or_else(|| eyre!("No baseline quote for benchmark {}", self.benchmark_symbol))?;
        let benchmark_close = benchmark_quote.previous_close().unwrap_or_default().to_string();
        let benchmark_price = parse_positive_decimal(&benchmark_close, "benchmark baseline")?;
        let benchmark_return = return_pct(&benchmark_close, &benchmark_close)?;
        let checkpoint_date = parse_trading_day(benchmark_quote)?;

        let batch = NewBatchModel::new(run_date, self.benchmark_symbol.trim(), benchmark_price);

        let mut picks = Vec::with_capacity(drafts.len());
        let mut pick_states = Vec::with_capacity(drafts.len());
        let mut metrics = Vec::with_capacity(drafts.len());
        for (draft, ticker) in drafts.iter().zip(&tickers) {
            let quote = quotes
                .get(ticker)
                .ok_or_else(|| eyre!("No baseline quote for pick {}", ticker))?;
            let close = quote.previous_close().unwrap_or_default().to_string();
            let initial_price = parse_positive_decimal(&close, "pick baseline")?;
            let pick = NewPickModel::new(batch.id, ticker.as_str(), draft.action, draft.reasoning.trim(), initial_price);

            metrics.push(NewPickCheckpointMetricModel {
                pick_id: pick.id,
                current_price: initial_price,
                absolute_return_pct: return_pct(&close, &close)?,
                vs_benchmark_pct: benchmark_return,
            });
            pick_states.push(PickState {
                pick_id: pick.id,
                ticker: ticker.clone(),
                action: draft.action,
                reasoning: pick.reasoning.clone(),
                initial_price: close,
            });
            picks.push(pick);
        }

        let initial_checkpoint =
            NewCheckpointModel::computed(batch.id, checkpoint_date, benchmark_price, benchmark_return, metrics);

        let created = match self.store.create_batch(&batch, &picks, &initial_checkpoint).await {
            Ok(created) => created,
            Err(StoreError::RunDateConflict { run_date }) => {
                return Err(eyre!("Batch already exists for run date {}", run_date));
            }
            Err(e) => return Err(e).wrap_err("Failed to store new batch"),
        };

        info!(
            batch_id = %created.batch_id,
            %run_date,
            %checkpoint_date,
            tickers = ?tickers,
            "Weekly batch initiated"
        );

        let state = WeeklyPickState {
            batch_id: created.batch_id,
            run_date,
            benchmark_symbol: batch.benchmark_symbol,
            benchmark_initial_price: benchmark_close,
            picks: pick_states,
        };
        // Register the loop so a worker restart before day 0 still resumes it
        self.store
            .save_loop_progress(&state, 0)
            .await
            .wrap_err("Failed to record loop progress")?;
        Ok(state)
    }
}
