use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::connection;
use super::schema;
use super::queries::{
    batches as batches_queries,
    picks as picks_queries,
    checkpoints as checkpoints_queries,
    pick_checkpoint_metrics as metrics_queries,
    loop_progress as loop_progress_queries,
};
use super::models::{
    batches::{BatchModel, BatchStatus, CreatedBatch, NewBatchModel},
    picks::{NewPickModel, PickModel},
    checkpoints::{CheckpointModel, CheckpointStatus, NewCheckpointModel},
    pick_checkpoint_metrics::PickCheckpointMetricModel,
};
use super::store::{CHECKPOINT_DATE_CONSTRAINT, CheckpointStore, RUN_DATE_CONSTRAINT, StoreError};
use crate::checkpoint::daily_loop::DAILY_CHECKPOINT_DAYS;
use crate::checkpoint::state::WeeklyPickState;
use crate::config::Config;

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointDetails {
    #[serde(flatten)]
    pub checkpoint: CheckpointModel,
    pub metrics: Vec<PickCheckpointMetricModel>,
}

/// A batch with everything recorded for it, checkpoints oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct BatchDetails {
    pub batch: BatchModel,
    pub picks: Vec<PickModel>,
    pub checkpoints: Vec<CheckpointDetails>,
}

pub struct DbManager {
    pub pool: PgPool,
}

impl DbManager {
    /// Creates a new database connection and initializes the schema
    pub async fn init(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = connection::create_pool(config).await?;

        // Ensure schema is initialized (creates tables if needed)
        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Saved snapshots of active batches whose loop has days left, with the day to resume at.
    #[instrument(skip(self))]
    pub async fn resumable_loops(&self) -> Result<Vec<(WeeklyPickState, u32)>, StoreError> {
        let rows = loop_progress_queries::get_resumable(&self.pool, DAILY_CHECKPOINT_DAYS as i32).await?;
        let loops: Vec<_> = rows
            .into_iter()
            .filter_map(|row| match u32::try_from(row.next_day) {
                Ok(next_day) => Some((row.state.0, next_day)),
                Err(_) => {
                    warn!(batch_id = %row.batch_id, next_day = row.next_day, "Ignoring loop progress with negative day");
                    None
                }
            })
            .collect();
        info!(count = loops.len(), "Loaded resumable checkpoint loops");
        Ok(loops)
    }

    pub async fn latest_batch(&self) -> Result<Option<BatchModel>, StoreError> {
        Ok(batches_queries::get_latest_batch(&self.pool).await?)
    }

    #[instrument(skip(self))]
    pub async fn batch_details(&self, batch_id: Uuid) -> Result<BatchDetails, StoreError> {
        let batch = batches_queries::get_batch_by_id(&self.pool, batch_id)
            .await?
            .ok_or(StoreError::BatchNotFound(batch_id))?;
        let picks = picks_queries::get_picks_for_batch(&self.pool, batch_id).await?;
        let checkpoints = checkpoints_queries::get_checkpoints_for_batch(&self.pool, batch_id).await?;

        let mut metrics_by_checkpoint: HashMap<Uuid, Vec<PickCheckpointMetricModel>> = HashMap::new();
        for metric in metrics_queries::get_metrics_for_batch(&self.pool, batch_id).await? {
            metrics_by_checkpoint.entry(metric.checkpoint_id).or_default().push(metric);
        }

        let checkpoints = checkpoints
            .into_iter()
            .map(|checkpoint| CheckpointDetails {
                metrics: metrics_by_checkpoint.remove(&checkpoint.id).unwrap_or_default(),
                checkpoint,
            })
            .collect();

        Ok(BatchDetails { batch, picks, checkpoints })
    }
}

#[async_trait]
impl CheckpointStore for DbManager {
    #[instrument(skip(self, batch, picks, initial_checkpoint), fields(run_date = %batch.run_date))]
    async fn create_batch(
        &self,
        batch: &NewBatchModel,
        picks: &[NewPickModel],
        initial_checkpoint: &NewCheckpointModel,
    ) -> Result<CreatedBatch, StoreError> {
        initial_checkpoint.validate().map_err(StoreError::InvalidCheckpoint)?;
        if initial_checkpoint.batch_id != batch.id || picks.iter().any(|p| p.batch_id != batch.id) {
            return Err(StoreError::InvalidCheckpoint(
                "picks and initial checkpoint must belong to the new batch".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        batches_queries::insert_batch(&mut *tx, batch)
            .await
            .map_err(|e| conflict_or_database(e, RUN_DATE_CONSTRAINT, || StoreError::RunDateConflict { run_date: batch.run_date }))?;

        for pick in picks {
            picks_queries::insert_pick(&mut *tx, pick).await?;
        }

        let checkpoint_id = Uuid::new_v4();
        checkpoints_queries::insert_checkpoint(&mut *tx, checkpoint_id, initial_checkpoint).await?;
        for metric in &initial_checkpoint.metrics {
            metrics_queries::insert_metric(&mut *tx, checkpoint_id, metric).await?;
        }

        tx.commit().await?;

        info!(batch_id = %batch.id, %checkpoint_id, pick_count = picks.len(), "Batch created");
        Ok(CreatedBatch {
            batch_id: batch.id,
            pick_ids: picks.iter().map(|p| p.id).collect(),
            checkpoint_id,
        })
    }

    #[instrument(skip(self, checkpoint), fields(batch_id = %checkpoint.batch_id, checkpoint_date = %checkpoint.checkpoint_date, status = %checkpoint.status))]
    async fn create_checkpoint(&self, checkpoint: &NewCheckpointModel) -> Result<Uuid, StoreError> {
        checkpoint.validate().map_err(StoreError::InvalidCheckpoint)?;

        let mut tx = self.pool.begin().await?;

        let pick_ids: HashSet<Uuid> = picks_queries::get_pick_ids_for_batch(&mut *tx, checkpoint.batch_id)
            .await?
            .into_iter()
            .collect();
        if pick_ids.is_empty() {
            return Err(StoreError::BatchNotFound(checkpoint.batch_id));
        }
        if checkpoint.status == CheckpointStatus::Computed {
            let metric_pick_ids: HashSet<Uuid> = checkpoint.metrics.iter().map(|m| m.pick_id).collect();
            if metric_pick_ids != pick_ids {
                return Err(StoreError::InvalidCheckpoint(
                    "computed checkpoint must carry one metric for every pick of the batch".to_string(),
                ));
            }
        }

        let checkpoint_id = Uuid::new_v4();
        checkpoints_queries::insert_checkpoint(&mut *tx, checkpoint_id, checkpoint)
            .await
            .map_err(|e| {
                conflict_or_database(e, CHECKPOINT_DATE_CONSTRAINT, || StoreError::CheckpointConflict {
                    batch_id: checkpoint.batch_id,
                    checkpoint_date: checkpoint.checkpoint_date,
                })
            })?;
        for metric in &checkpoint.metrics {
            metrics_queries::insert_metric(&mut *tx, checkpoint_id, metric).await?;
        }

        tx.commit().await?;

        debug!(%checkpoint_id, metric_count = checkpoint.metrics.len(), "Checkpoint stored");
        Ok(checkpoint_id)
    }

    #[instrument(skip(self))]
    async fn update_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError> {
        let matched = batches_queries::update_batch_status(&self.pool, batch_id, status).await?;
        if matched == 0 {
            return Err(StoreError::BatchNotFound(batch_id));
        }
        info!(%status, "Batch status updated");
        Ok(())
    }

    async fn load_loop_progress(&self, batch_id: Uuid) -> Result<Option<u32>, StoreError> {
        let next_day = loop_progress_queries::get_next_day(&self.pool, batch_id).await?;
        Ok(next_day.map(|day| day.max(0) as u32))
    }

    async fn save_loop_progress(&self, state: &WeeklyPickState, next_day: u32) -> Result<(), StoreError> {
        let next_day = next_day.min(DAILY_CHECKPOINT_DAYS) as i32;
        loop_progress_queries::upsert_progress(&self.pool, state, next_day)
            .await
            .map_err(|e| foreign_key_or_database(e, state.batch_id))
    }
}

/// Turn a unique violation on `constraint` into the given conflict, anything else into `Database`.
fn conflict_or_database<F>(err: sqlx::Error, constraint: &str, conflict: F) -> StoreError
where
    F: FnOnce() -> StoreError,
{
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.constraint() == Some(constraint) {
            return conflict();
        }
    }
    StoreError::Database(err)
}

fn foreign_key_or_database(err: sqlx::Error, batch_id: Uuid) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return StoreError::BatchNotFound(batch_id);
        }
    }
    StoreError::Database(err)
}
