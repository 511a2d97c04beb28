use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PickCheckpointMetricModel {
    pub id: Uuid,
    pub checkpoint_id: Uuid,
    pub pick_id: Uuid,
    pub current_price: Decimal,
    pub absolute_return_pct: Decimal,
    pub vs_benchmark_pct: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Metric row written together with its parent checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPickCheckpointMetricModel {
    pub pick_id: Uuid,
    pub current_price: Decimal,
    pub absolute_return_pct: Decimal,
    pub vs_benchmark_pct: Decimal,
}
