use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;
use super::pick_checkpoint_metrics::NewPickCheckpointMetricModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Computed,
    Skipped,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Computed => "computed",
            CheckpointStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "computed" => Ok(CheckpointStatus::Computed),
            "skipped" => Ok(CheckpointStatus::Skipped),
            other => Err(UnknownVariant {
                kind: "checkpoint status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CheckpointModel {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub checkpoint_date: NaiveDate,
    pub status: String,
    pub benchmark_price: Option<Decimal>,
    pub benchmark_return_pct: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl CheckpointModel {
    pub fn status(&self) -> Result<CheckpointStatus, UnknownVariant> {
        self.status.parse()
    }
}

/// Checkpoint plus the metric rows that must land in the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckpointModel {
    pub batch_id: Uuid,
    pub checkpoint_date: NaiveDate,
    pub status: CheckpointStatus,
    pub benchmark_price: Option<Decimal>,
    pub benchmark_return_pct: Option<Decimal>,
    pub metrics: Vec<NewPickCheckpointMetricModel>,
}

impl NewCheckpointModel {
    pub fn skipped(batch_id: Uuid, checkpoint_date: NaiveDate) -> Self {
        Self {
            batch_id,
            checkpoint_date,
            status: CheckpointStatus::Skipped,
            benchmark_price: None,
            benchmark_return_pct: None,
            metrics: Vec::new(),
        }
    }

    pub fn computed(
        batch_id: Uuid,
        checkpoint_date: NaiveDate,
        benchmark_price: Decimal,
        benchmark_return_pct: Decimal,
        metrics: Vec<NewPickCheckpointMetricModel>,
    ) -> Self {
        Self {
            batch_id,
            checkpoint_date,
            status: CheckpointStatus::Computed,
            benchmark_price: Some(benchmark_price),
            benchmark_return_pct: Some(benchmark_return_pct),
            metrics,
        }
    }

    /// Shape check run before any write: computed rows carry both benchmark
    /// fields and one metric per distinct pick, skipped rows carry nothing.
    pub fn validate(&self) -> Result<(), String> {
        match self.status {
            CheckpointStatus::Computed => {
                if self.benchmark_price.is_none() || self.benchmark_return_pct.is_none() {
                    return Err("computed checkpoint requires benchmark price and return".to_string());
                }
                if self.metrics.is_empty() {
                    return Err("computed checkpoint requires pick metrics".to_string());
                }
                let mut seen = HashSet::new();
                for metric in &self.metrics {
                    if !seen.insert(metric.pick_id) {
                        return Err(format!("duplicate metric for pick {}", metric.pick_id));
                    }
                }
                Ok(())
            }
            CheckpointStatus::Skipped => {
                if self.benchmark_price.is_some() || self.benchmark_return_pct.is_some() {
                    return Err("skipped checkpoint must not carry benchmark values".to_string());
                }
                if !self.metrics.is_empty() {
                    return Err("skipped checkpoint must not carry pick metrics".to_string());
                }
                Ok(())
            }
        }
    }
}
