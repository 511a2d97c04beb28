use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::quote::{FetchError, MarketDataProvider, Quote};
use crate::config::Config;

const PREVIOUS_CLOSE_KEY: &str = "08. previous close";
const LATEST_TRADING_DAY_KEY: &str = "07. latest trading day";
const MAX_ERROR_BODY_CHARS: usize = 512;
const MAX_RESPONSE_BYTES: usize = 2 << 20;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

// Every request needs a permit from both the per-minute and the per-day quota
struct AlphaVantageRateLimiter {
    per_minute: Arc<DefaultDirectRateLimiter>,
    per_day: Arc<DefaultDirectRateLimiter>,
}

impl reqwest_ratelimit::RateLimiter for AlphaVantageRateLimiter {
    async fn acquire_permit(&self) {
        self.per_day.until_ready().await;
        self.per_minute.until_ready().await;
    }
}

fn minute_quota(requests: u32) -> eyre::Result<Quota> {
    let requests = NonZeroU32::new(requests)
        .ok_or_else(|| eyre::eyre!("Alpha Vantage rate limit must be at least one request per minute"))?;
    Ok(Quota::per_minute(requests))
}

/// The full daily allowance may be spent at once; it refills evenly over the day.
fn daily_quota(requests: u32) -> eyre::Result<Quota> {
    let requests = NonZeroU32::new(requests)
        .ok_or_else(|| eyre::eyre!("Alpha Vantage rate limit must be at least one request per day"))?;
    let quota = Quota::with_period(Duration::from_secs(SECONDS_PER_DAY) / requests.get())
        .ok_or_else(|| eyre::eyre!("Alpha Vantage daily rate limit of {} is too high", requests))?;
    Ok(quota.allow_burst(requests))
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    global_quote: HashMap<String, String>,
    // Alpha Vantage answers throttled calls with 200 and one of these notices
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

/// GLOBAL_QUOTE client. One HTTP attempt per call, paced by per-minute and per-day limiters.
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    http_client: ClientWithMiddleware,
    base_url: String,
    api_key: String,
}

impl AlphaVantageClient {
    pub fn new(config: &Config) -> eyre::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let rate_limiter = AlphaVantageRateLimiter {
            per_minute: Arc::new(DefaultDirectRateLimiter::direct(minute_quota(
                config.alpha_vantage_requests_per_minute,
            )?)),
            per_day: Arc::new(DefaultDirectRateLimiter::direct(daily_quota(
                config.alpha_vantage_requests_per_day,
            )?)),
        };

        let http_client = ClientBuilder::new(reqwest_client)
            .with(reqwest_ratelimit::all(rate_limiter))
            .build();

        Ok(Self {
            http_client,
            base_url: config.alpha_vantage_base_url.clone(),
            api_key: config.alpha_vantage_api_key.clone(),
        })
    }

    async fn fetch_once(&self, symbol: &str) -> Result<Quote, FetchError> {
        let params = [
            ("function", "GLOBAL_QUOTE"),
            ("symbol", symbol),
            ("apikey", self.api_key.as_str()),
        ];

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| transport_error(symbol, e))?;

        let status = response.status();
        let body = read_capped_body(symbol, response).await?;

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                symbol: symbol.to_string(),
                status: status.as_u16(),
                body: body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        parse_global_quote(symbol, &body)
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageClient {
    #[instrument(skip(self))]
    async fn fetch_previous_close(&self, symbol: &str) -> Result<Quote, FetchError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(FetchError::InvalidSymbol);
        }
        let quote = self.fetch_once(symbol).await?;
        debug!(previous_close = %quote.previous_close, trading_day = %quote.trading_day, "Received previous close");
        Ok(quote)
    }
}

/// Reads at most `MAX_RESPONSE_BYTES`; a longer body fails the call.
async fn read_capped_body(symbol: &str, mut response: reqwest::Response) -> Result<String, FetchError> {
    if let Some(declared) = response.content_length() {
        check_body_size(symbol, usize::try_from(declared).unwrap_or(usize::MAX))?;
    }
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| FetchError::Transport {
        symbol: symbol.to_string(),
        message: e.to_string(),
    })? {
        check_body_size(symbol, body.len().saturating_add(chunk.len()))?;
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn check_body_size(symbol: &str, len: usize) -> Result<(), FetchError> {
    if len > MAX_RESPONSE_BYTES {
        return Err(FetchError::Decode {
            symbol: symbol.to_string(),
            message: format!("response body exceeds {} bytes", MAX_RESPONSE_BYTES),
        });
    }
    Ok(())
}

fn transport_error(symbol: &str, err: reqwest_middleware::Error) -> FetchError {
    FetchError::Transport {
        symbol: symbol.to_string(),
        message: err.to_string(),
    }
}

/// Decode a GLOBAL_QUOTE payload. Missing quote keys produce blank fields.
pub fn parse_global_quote(symbol: &str, body: &str) -> Result<Quote, FetchError> {
    let parsed: GlobalQuoteResponse = serde_json::from_str(body).map_err(|e| FetchError::Decode {
        symbol: symbol.to_string(),
        message: e.to_string(),
    })?;

    if let Some(message) = parsed.error_message {
        // Unknown symbols come back as 200 with an error message
        return Err(FetchError::HttpStatus {
            symbol: symbol.to_string(),
            status: 400,
            body: message,
        });
    }
    if parsed.global_quote.is_empty() {
        if let Some(message) = parsed.note.or(parsed.information) {
            return Err(FetchError::RateLimited {
                symbol: symbol.to_string(),
                message,
            });
        }
    }

    let field = |key: &str| parsed.global_quote.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
    Ok(Quote {
        symbol: symbol.to_string(),
        previous_close: field(PREVIOUS_CLOSE_KEY),
        trading_day: field(LATEST_TRADING_DAY_KEY),
    })
}
