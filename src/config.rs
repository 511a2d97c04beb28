use chrono_tz::Tz;
use dotenvy::dotenv;
use eyre::{Result, WrapErr, eyre};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::{self, RetryPolicy};

pub const DEFAULT_ALPHA_VANTAGE_BASE_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_BENCHMARK_SYMBOL: &str = "SPY";
pub const DEFAULT_HOME_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_PICKS_FILE: &str = "picks.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub alpha_vantage_api_key: String,
    pub alpha_vantage_base_url: String,
    pub alpha_vantage_requests_per_minute: u32,
    pub alpha_vantage_requests_per_day: u32,
    pub benchmark_symbol: String,
    pub home_timezone: Tz,
    pub retry_policy: RetryPolicy,
    pub picks_file: PathBuf,
}

impl Config {
    /// Load from `.env` (if present) and the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").ok_or_else(|| eyre!("Missing DATABASE_URL"))?;
        let alpha_vantage_api_key = var("ALPHA_VANTAGE_API_KEY").ok_or_else(|| eyre!("Missing ALPHA_VANTAGE_API_KEY"))?;
        let alpha_vantage_base_url = var("ALPHA_VANTAGE_BASE_URL").unwrap_or_else(|| DEFAULT_ALPHA_VANTAGE_BASE_URL.to_string());
        let benchmark_symbol = var("BENCHMARK_SYMBOL").unwrap_or_else(|| DEFAULT_BENCHMARK_SYMBOL.to_string());

        let timezone_name = var("HOME_TIMEZONE").unwrap_or_else(|| DEFAULT_HOME_TIMEZONE.to_string());
        let home_timezone = Tz::from_str(&timezone_name)
            .map_err(|e| eyre!("Invalid HOME_TIMEZONE {:?}: {}", timezone_name, e))?;

        let alpha_vantage_requests_per_minute = parse_or(&var, "ALPHA_VANTAGE_REQUESTS_PER_MINUTE", 5u32)?;
        if alpha_vantage_requests_per_minute == 0 {
            return Err(eyre!("ALPHA_VANTAGE_REQUESTS_PER_MINUTE must be at least 1"));
        }
        let alpha_vantage_requests_per_day = parse_or(&var, "ALPHA_VANTAGE_REQUESTS_PER_DAY", 500u32)?;
        if alpha_vantage_requests_per_day == 0 {
            return Err(eyre!("ALPHA_VANTAGE_REQUESTS_PER_DAY must be at least 1"));
        }
        let db_max_connections = parse_or(&var, "DB_MAX_CONNECTIONS", 5u32)?;
        let picks_file = PathBuf::from(var("PICKS_FILE").unwrap_or_else(|| DEFAULT_PICKS_FILE.to_string()));

        let retry_policy = RetryPolicy::new(
            parse_or(&var, "RETRY_MAX_ATTEMPTS", retry::DEFAULT_MAX_ATTEMPTS)?,
            Duration::from_millis(parse_or(&var, "RETRY_BASE_DELAY_MS", retry::DEFAULT_BASE_DELAY.as_millis() as u64)?),
            Duration::from_millis(parse_or(&var, "RETRY_MAX_DELAY_MS", retry::DEFAULT_MAX_DELAY.as_millis() as u64)?),
            parse_or(&var, "RETRY_JITTER", retry::DEFAULT_JITTER)?,
        );

        Ok(Config {
            database_url,
            db_max_connections,
            alpha_vantage_api_key,
            alpha_vantage_base_url,
            alpha_vantage_requests_per_minute,
            alpha_vantage_requests_per_day,
            benchmark_symbol,
            home_timezone,
            retry_policy,
            picks_file,
        })
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.parse::<T>().wrap_err_with(|| format!("Invalid {} value {:?}", key, raw)),
        None => Ok(default),
    }
}
