use sqlx::{Error, PgExecutor};
use uuid::Uuid;

use crate::db::models::pick_checkpoint_metrics::{NewPickCheckpointMetricModel, PickCheckpointMetricModel};

pub async fn insert_metric<'e, E>(executor: E, checkpoint_id: Uuid, metric: &NewPickCheckpointMetricModel) -> Result<(), Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO pick_checkpoint_metrics
            (id, checkpoint_id, pick_id, current_price, absolute_return_pct, vs_benchmark_pct)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(checkpoint_id)
    .bind(metric.pick_id)
    .bind(metric.current_price)
    .bind(metric.absolute_return_pct)
    .bind(metric.vs_benchmark_pct)
    .execute(executor)
    .await?;

    Ok(())
}

/// Every metric recorded for a batch, across all of its checkpoints
pub async fn get_metrics_for_batch<'e, E>(executor: E, batch_id: Uuid) -> Result<Vec<PickCheckpointMetricModel>, Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PickCheckpointMetricModel>(
        r#"
        SELECT m.id, m.checkpoint_id, m.pick_id, m.current_price, m.absolute_return_pct,
               m.vs_benchmark_pct, m.created_at
        FROM pick_checkpoint_metrics m
        JOIN checkpoints c ON c.id = m.checkpoint_id
        WHERE c.batch_id = $1
        "#,
    )
    .bind(batch_id)
    .fetch_all(executor)
    .await
}
