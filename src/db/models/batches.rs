use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Active,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BatchStatus::Active),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(UnknownVariant {
                kind: "batch status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BatchModel {
    pub id: Uuid,
    pub run_date: NaiveDate,
    pub benchmark_symbol: String,
    pub benchmark_initial_price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Batch row to insert. The id is assigned up front so picks can reference it
/// inside the same transaction.
#[derive(Debug, Clone)]
pub struct NewBatchModel {
    pub id: Uuid,
    pub run_date: NaiveDate,
    pub benchmark_symbol: String,
    pub benchmark_initial_price: Decimal,
    pub status: BatchStatus,
}

impl NewBatchModel {
    pub fn new(run_date: NaiveDate, benchmark_symbol: impl Into<String>, benchmark_initial_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_date,
            benchmark_symbol: benchmark_symbol.into(),
            benchmark_initial_price,
            status: BatchStatus::Active,
        }
    }
}

/// Identities generated by a successful batch creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBatch {
    pub batch_id: Uuid,
    pub pick_ids: Vec<Uuid>,
    pub checkpoint_id: Uuid,
}
