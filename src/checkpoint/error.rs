use thiserror::Error;

use crate::db::store::StoreError;
use crate::market_data::FetchError;
use crate::retry::Cancelled;
use crate::return_calculation_utils::DecimalError;

/// Anything that aborts a daily cycle, and with it the whole loop.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("quote fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("return calculation failed: {0}")]
    Arithmetic(#[from] DecimalError),
    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
    #[error("{symbol} reported a previous close without a trading day")]
    MissingTradingDay { symbol: String },
    #[error("{symbol} reported malformed trading day {value:?}")]
    InvalidTradingDay { symbol: String, value: String },
    #[error("no price for pick {ticker} in the fetched snapshot")]
    MissingPickQuote { ticker: String },
    #[error("cannot schedule checkpoint: {0}")]
    Schedule(String),
    #[error("checkpoint loop cancelled")]
    Cancelled,
}

impl CheckpointError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CheckpointError::Cancelled | CheckpointError::Fetch(FetchError::Cancelled))
    }
}

impl From<Cancelled> for CheckpointError {
    fn from(_: Cancelled) -> Self {
        CheckpointError::Cancelled
    }
}
