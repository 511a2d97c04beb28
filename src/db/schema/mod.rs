use sqlx::{
    Executor,
    postgres::PgPool,
};

pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    pool.execute(include_str!("batches.sql")).await?;
    pool.execute(include_str!("picks.sql")).await?;
    pool.execute(include_str!("checkpoints.sql")).await?;
    pool.execute(include_str!("pick_checkpoint_metrics.sql")).await?;
    pool.execute(include_str!("checkpoint_loop_progress.sql")).await?;

    // Lookups by batch for details and resume
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_checkpoints_batch_date
        ON checkpoints(batch_id, checkpoint_date);
        "#
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_batches_status
        ON batches(status);
        "#
    )
    .execute(pool)
    .await?;

    Ok(())
}
