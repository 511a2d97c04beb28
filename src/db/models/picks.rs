use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::picks::PickAction;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PickModel {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub ticker: String,
    pub action: String,
    pub reasoning: String,
    pub initial_price: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPickModel {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub ticker: String,
    pub action: PickAction,
    pub reasoning: String,
    pub initial_price: Decimal,
}

impl NewPickModel {
    pub fn new(batch_id: Uuid, ticker: impl Into<String>, action: PickAction, reasoning: impl Into<String>, initial_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_id,
            ticker: ticker.into(),
            action,
            reasoning: reasoning.into(),
            initial_price,
        }
    }
}
