use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use crate::checkpoint::state::WeeklyPickState;

#[derive(Debug, Clone, FromRow)]
pub struct LoopProgressModel {
    pub batch_id: Uuid,
    pub next_day: i32,
    pub state: Json<WeeklyPickState>,
    pub updated_at: DateTime<Utc>,
}
