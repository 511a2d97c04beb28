use sqlx::types::Json;
use sqlx::{Error, PgExecutor};
use uuid::Uuid;

use crate::checkpoint::state::WeeklyPickState;
use crate::db::models::loop_progress::LoopProgressModel;

/// Record the first unfinished day of a batch's loop along with its snapshot.
pub async fn upsert_progress<'e, E>(executor: E, state: &WeeklyPickState, next_day: i32) -> Result<(), Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO checkpoint_loop_progress (batch_id, next_day, state, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (batch_id) DO UPDATE
        SET next_day = EXCLUDED.next_day,
            state = EXCLUDED.state,
            updated_at = NOW()
        "#,
    )
    .bind(state.batch_id)
    .bind(next_day)
    .bind(Json(state))
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn get_next_day<'e, E>(executor: E, batch_id: Uuid) -> Result<Option<i32>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, i32>("SELECT next_day FROM checkpoint_loop_progress WHERE batch_id = $1")
        .bind(batch_id)
        .fetch_optional(executor)
        .await
}

/// Loops of active batches that still have days left to run
pub async fn get_resumable<'e, E>(executor: E, total_days: i32) -> Result<Vec<LoopProgressModel>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, LoopProgressModel>(
        r#"
        SELECT p.batch_id, p.next_day, p.state, p.updated_at
        FROM checkpoint_loop_progress p
        JOIN batches b ON b.id = p.batch_id
        WHERE b.status = 'active' AND p.next_day < $1
        ORDER BY b.run_date
        "#,
    )
    .bind(total_days)
    .fetch_all(executor)
    .await
}
