use async_trait::async_trait;
use thiserror::Error;

use crate::retry::Cancelled;

/// Previous-close quote for one symbol. Blank fields mean the provider had no
/// completed session to report, which is a valid answer rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quote {
    pub symbol: String,
    pub previous_close: String,
    pub trading_day: String,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, previous_close: impl Into<String>, trading_day: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            previous_close: previous_close.into(),
            trading_day: trading_day.into(),
        }
    }

    /// Trimmed previous close, `None` when blank.
    pub fn previous_close(&self) -> Option<&str> {
        non_blank(&self.previous_close)
    }

    /// Trimmed trading day, `None` when blank.
    pub fn trading_day(&self) -> Option<&str> {
        non_blank(&self.trading_day)
    }

    pub fn has_previous_close(&self) -> bool {
        self.previous_close().is_some()
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("market data request for {symbol} failed: {message}")]
    Transport { symbol: String, message: String },
    #[error("market data request for {symbol} failed with status {status}: {body}")]
    HttpStatus { symbol: String, status: u16, body: String },
    #[error("market data provider throttled request for {symbol}: {message}")]
    RateLimited { symbol: String, message: String },
    #[error("failed to decode market data response for {symbol}: {message}")]
    Decode { symbol: String, message: String },
    #[error("symbol is required")]
    InvalidSymbol,
    #[error("missing {field} for {symbol}")]
    MissingField { symbol: String, field: &'static str },
    #[error("market data fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Transport failures, throttling and 429/5xx responses are worth another attempt.
    /// Client errors, malformed payloads and cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::RateLimited { .. } => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decode { .. }
            | FetchError::InvalidSymbol
            | FetchError::MissingField { .. }
            | FetchError::Cancelled => false,
        }
    }
}

impl From<Cancelled> for FetchError {
    fn from(_: Cancelled) -> Self {
        FetchError::Cancelled
    }
}

/// One previous-close lookup against the market data source. Implementations make a
/// single attempt; retries belong to the caller.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_previous_close(&self, symbol: &str) -> Result<Quote, FetchError>;
}
