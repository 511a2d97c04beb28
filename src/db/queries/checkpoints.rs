use sqlx::{Error, PgExecutor};
use uuid::Uuid;

use crate::db::models::checkpoints::{CheckpointModel, NewCheckpointModel};

/// Insert the checkpoint row only; metrics are written separately in the same transaction.
/// A second row for the same (batch, date) violates `checkpoints_batch_date_unique`.
pub async fn insert_checkpoint<'e, E>(executor: E, checkpoint_id: Uuid, checkpoint: &NewCheckpointModel) -> Result<(), Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO checkpoints (id, batch_id, checkpoint_date, status, benchmark_price, benchmark_return_pct)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(checkpoint_id)
    .bind(checkpoint.batch_id)
    .bind(checkpoint.checkpoint_date)
    .bind(checkpoint.status.as_str())
    .bind(checkpoint.benchmark_price)
    .bind(checkpoint.benchmark_return_pct)
    .execute(executor)
    .await?;

    Ok(())
}

/// All checkpoints of a batch, oldest first
pub async fn get_checkpoints_for_batch<'e, E>(executor: E, batch_id: Uuid) -> Result<Vec<CheckpointModel>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, CheckpointModel>(
        r#"
        SELECT id, batch_id, checkpoint_date, status, benchmark_price, benchmark_return_pct, created_at
        FROM checkpoints
        WHERE batch_id = $1
        ORDER BY checkpoint_date
        "#,
    )
    .bind(batch_id)
    .fetch_all(executor)
    .await
}
