use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use super::error::CheckpointError;
use crate::market_data::Quote;

/// Local hour of every daily checkpoint and of the weekly trigger.
pub const CHECKPOINT_HOUR: u32 = 9;
pub const TRADING_DAY_FORMAT: &str = "%Y-%m-%d";

/// `run_date + day` at 09:00 local wall time, resolved to UTC. An ambiguous
/// local time takes the earlier instant.
pub fn daily_target(run_date: NaiveDate, day: u32, tz: Tz) -> Result<DateTime<Utc>, CheckpointError> {
    let date = run_date
        .checked_add_days(Days::new(u64::from(day)))
        .ok_or_else(|| CheckpointError::Schedule(format!("day {} after {} is out of range", day, run_date)))?;
    local_at_checkpoint_hour(date, tz)
}

pub fn daily_targets(run_date: NaiveDate, days: u32, tz: Tz) -> Result<Vec<DateTime<Utc>>, CheckpointError> {
    (0..days).map(|day| daily_target(run_date, day, tz)).collect()
}

fn local_at_checkpoint_hour(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, CheckpointError> {
    let local = date
        .and_hms_opt(CHECKPOINT_HOUR, 0, 0)
        .ok_or_else(|| CheckpointError::Schedule(format!("invalid checkpoint hour on {}", date)))?;
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CheckpointError::Schedule(format!("{} does not exist in {}", local, tz)))
}

/// Date recorded for a skipped checkpoint when the benchmark has no trading day:
/// the day before the scheduled local date, moved back over weekends.
pub fn previous_trading_day_fallback(scheduled_at: DateTime<Utc>, tz: Tz) -> NaiveDate {
    let mut date = scheduled_at.with_timezone(&tz).date_naive();
    loop {
        date = match date.pred_opt() {
            Some(prev) => prev,
            None => return date,
        };
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return date;
        }
    }
}

/// Trading day of a quote that has a previous close.
pub fn parse_trading_day(quote: &Quote) -> Result<NaiveDate, CheckpointError> {
    let raw = quote.trading_day().ok_or_else(|| CheckpointError::MissingTradingDay {
        symbol: quote.symbol.clone(),
    })?;
    NaiveDate::parse_from_str(raw, TRADING_DAY_FORMAT).map_err(|_| CheckpointError::InvalidTradingDay {
        symbol: quote.symbol.clone(),
        value: raw.to_string(),
    })
}

/// First Monday 09:00 local strictly after `now`.
pub fn next_weekly_trigger(now: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, CheckpointError> {
    let today = now.with_timezone(&tz).date_naive();
    let days_to_monday = (7 - today.weekday().num_days_from_monday()) % 7;
    let mut candidate = today + Days::new(u64::from(days_to_monday));
    loop {
        let trigger = local_at_checkpoint_hour(candidate, tz)?;
        if trigger > now {
            return Ok(trigger);
        }
        candidate = candidate + Days::new(7);
    }
}
