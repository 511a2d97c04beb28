use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::picks::PickAction;

/// Immutable snapshot threaded through every daily cycle of one batch.
/// Prices are kept as the decimal strings they were recorded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyPickState {
    pub batch_id: Uuid,
    pub run_date: NaiveDate,
    pub benchmark_symbol: String,
    pub benchmark_initial_price: String,
    pub picks: Vec<PickState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickState {
    pub pick_id: Uuid,
    pub ticker: String,
    pub action: PickAction,
    pub reasoning: String,
    pub initial_price: String,
}

impl WeeklyPickState {
    pub fn tickers(&self) -> Vec<String> {
        self.picks.iter().map(|p| p.ticker.clone()).collect()
    }
}
