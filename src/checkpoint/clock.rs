use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::retry::Cancelled;

/// Longest single sleep before the wall clock is consulted again.
pub const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Wait until the wall clock reaches `target`, in slices of at most
/// [`MAX_SLEEP_SLICE`] so suspend/resume of the host or clock jumps are
/// noticed. A target already in the past returns at once.
pub async fn sleep_until(
    clock: &dyn Clock,
    sleeper: &dyn Sleeper,
    target: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        let remaining = match (target - clock.now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => return Ok(()),
        };
        let slice = remaining.min(MAX_SLEEP_SLICE);
        debug!(%target, remaining_secs = remaining.as_secs(), "Sleeping until target");
        tokio::select! {
            _ = cancel.cancelled() => return Err(Cancelled),
            _ = sleeper.sleep(slice) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, RecordingSleeper};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn past_target_returns_without_sleeping() {
        let clock = Arc::new(ManualClock::new(start()));
        let sleeper = RecordingSleeper::new(clock.clone());

        sleep_until(clock.as_ref(), &sleeper, start() - chrono::Duration::hours(5), &CancellationToken::new())
            .await
            .unwrap();
        sleep_until(clock.as_ref(), &sleeper, start(), &CancellationToken::new()).await.unwrap();

        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn long_waits_are_sliced() {
        let clock = Arc::new(ManualClock::new(start()));
        let sleeper = RecordingSleeper::new(clock.clone());
        let target = start() + chrono::Duration::minutes(150);

        sleep_until(clock.as_ref(), &sleeper, target, &CancellationToken::new()).await.unwrap();

        assert_eq!(
            sleeper.sleeps(),
            vec![MAX_SLEEP_SLICE, MAX_SLEEP_SLICE, Duration::from_secs(30 * 60)]
        );
        assert_eq!(clock.now(), target);
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_wait() {
        let clock = Arc::new(ManualClock::new(start()));
        let sleeper = RecordingSleeper::new(clock.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sleep_until(clock.as_ref(), &sleeper, start() + chrono::Duration::hours(1), &cancel).await;

        assert_eq!(result, Err(Cancelled));
        assert!(sleeper.sleeps().is_empty());
    }
}
