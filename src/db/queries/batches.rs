use sqlx::{Error, PgExecutor};
use uuid::Uuid;

use crate::db::models::batches::{BatchModel, BatchStatus, NewBatchModel};

/// Insert a batch row. A second batch for the same run date violates `batches_run_date_unique`.
pub async fn insert_batch<'e, E>(executor: E, batch: &NewBatchModel) -> Result<(), Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO batches (id, run_date, benchmark_symbol, benchmark_initial_price, status)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(batch.id)
    .bind(batch.run_date)
    .bind(&batch.benchmark_symbol)
    .bind(batch.benchmark_initial_price)
    .bind(batch.status.as_str())
    .execute(executor)
    .await?;

    Ok(())
}

/// Set the status of a batch, leaving `updated_at` alone when nothing changes.
/// Returns the number of matched rows (0 when the batch does not exist).
pub async fn update_batch_status<'e, E>(executor: E, batch_id: Uuid, status: BatchStatus) -> Result<u64, Error>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        UPDATE batches
        SET status = $2,
            updated_at = CASE WHEN status = $2 THEN updated_at ELSE NOW() END
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .bind(status.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Fetch a batch by its id
pub async fn get_batch_by_id<'e, E>(executor: E, batch_id: Uuid) -> Result<Option<BatchModel>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, BatchModel>(
        r#"
        SELECT id, run_date, benchmark_symbol, benchmark_initial_price, status, created_at, updated_at
        FROM batches
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_optional(executor)
    .await
}

/// Most recent batch by run date
pub async fn get_latest_batch<'e, E>(executor: E) -> Result<Option<BatchModel>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, BatchModel>(
        r#"
        SELECT id, run_date, benchmark_symbol, benchmark_initial_price, status, created_at, updated_at
        FROM batches
        ORDER BY run_date DESC LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await
}
