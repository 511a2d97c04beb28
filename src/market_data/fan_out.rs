use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::quote::{FetchError, MarketDataProvider, Quote};
use crate::retry::RetryPolicy;

/// Maximum number of pick quotes in flight at once.
pub const PRICE_FANOUT_CONCURRENCY: usize = 3;

/// Outcome of one day's quote collection. `D` is whatever the caller's benchmark
/// check derived from the benchmark quote before the picks were requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailySnapshot<D> {
    /// The benchmark had no previous close; pick quotes were not requested.
    BenchmarkClosed { benchmark: Quote },
    Quotes {
        benchmark: Quote,
        benchmark_day: D,
        picks: HashMap<String, Quote>,
    },
}

/// Retrieves previous-close quotes for a benchmark and a set of picks, retrying
/// each symbol independently and bounding concurrent requests.
pub struct QuoteFetcher {
    provider: Arc<dyn MarketDataProvider>,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl QuoteFetcher {
    pub fn new(provider: Arc<dyn MarketDataProvider>, retry_policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            provider,
            retry_policy,
            cancel,
        }
    }

    /// Single symbol lookup wrapped in the retry policy.
    #[instrument(skip(self))]
    pub async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(FetchError::InvalidSymbol);
        }
        self.retry_policy
            .retry_async(&self.cancel, FetchError::is_retryable, |attempt| async move {
                let result = self.provider.fetch_previous_close(symbol).await;
                if let Err(e) = &result {
                    warn!(symbol, attempt, error = %e, "Previous close fetch failed");
                }
                result
            })
            .await
    }

    /// Benchmark first, then the distinct pick tickers concurrently. Stops at the
    /// benchmark when it reports no previous close. Otherwise `check_benchmark` runs
    /// on the benchmark quote before any pick is requested, and its error ends the
    /// snapshot without spending requests on the picks.
    #[instrument(skip(self, pick_tickers, check_benchmark), fields(pick_count = pick_tickers.len()))]
    pub async fn fetch_daily_snapshot<D, E>(
        &self,
        benchmark_symbol: &str,
        pick_tickers: &[String],
        check_benchmark: impl FnOnce(&Quote) -> Result<D, E>,
    ) -> Result<DailySnapshot<D>, E>
    where
        E: From<FetchError>,
    {
        let benchmark = self.fetch_quote(benchmark_symbol).await?;
        if !benchmark.has_previous_close() {
            info!(benchmark = %benchmark.symbol, "Benchmark has no previous close, skipping pick quotes");
            return Ok(DailySnapshot::BenchmarkClosed { benchmark });
        }
        let benchmark_day = check_benchmark(&benchmark)?;

        let picks = self.fetch_pick_quotes(pick_tickers).await?;
        Ok(DailySnapshot::Quotes {
            benchmark,
            benchmark_day,
            picks,
        })
    }

    /// Quotes keyed by trimmed ticker. The first failing symbol fails the whole call
    /// and drops the requests still in flight.
    pub async fn fetch_pick_quotes(&self, pick_tickers: &[String]) -> Result<HashMap<String, Quote>, FetchError> {
        let tickers = distinct_tickers(pick_tickers)?;
        let expected = tickers.len();

        let mut in_flight = stream::iter(tickers)
            .map(|ticker| async move {
                let result = self.fetch_quote(&ticker).await;
                (ticker, result)
            })
            .buffer_unordered(PRICE_FANOUT_CONCURRENCY);

        let mut quotes = HashMap::with_capacity(expected);
        while let Some((ticker, result)) = in_flight.next().await {
            let quote = result?;
            quotes.insert(ticker, quote);
        }
        debug!(quote_count = quotes.len(), "Pick quotes collected");
        Ok(quotes)
    }

    /// Baseline snapshot for a new batch. Every symbol must report both a previous
    /// close and a trading day.
    #[instrument(skip(self, pick_tickers))]
    pub async fn fetch_initial_snapshot(&self, benchmark_symbol: &str, pick_tickers: &[String]) -> Result<HashMap<String, Quote>, FetchError> {
        let benchmark = self.fetch_quote(benchmark_symbol).await?;
        require_complete(&benchmark)?;

        let mut quotes = self.fetch_pick_quotes(pick_tickers).await?;
        for quote in quotes.values() {
            require_complete(quote)?;
        }
        quotes.insert(benchmark_symbol.trim().to_string(), benchmark);
        Ok(quotes)
    }
}

fn distinct_tickers(pick_tickers: &[String]) -> Result<Vec<String>, FetchError> {
    let mut seen = HashSet::new();
    let mut tickers = Vec::with_capacity(pick_tickers.len());
    for ticker in pick_tickers {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(FetchError::InvalidSymbol);
        }
        if seen.insert(ticker.to_string()) {
            tickers.push(ticker.to_string());
        }
    }
    Ok(tickers)
}

fn require_complete(quote: &Quote) -> Result<(), FetchError> {
    if quote.previous_close().is_none() {
        return Err(FetchError::MissingField {
            symbol: quote.symbol.clone(),
            field: "previous close",
        });
    }
    if quote.trading_day().is_none() {
        return Err(FetchError::MissingField {
            symbol: quote.symbol.clone(),
            field: "trading day",
        });
    }
    Ok(())
}
