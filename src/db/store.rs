use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use super::models::batches::{BatchStatus, CreatedBatch, NewBatchModel};
use super::models::checkpoints::NewCheckpointModel;
use super::models::picks::NewPickModel;
use crate::checkpoint::state::WeeklyPickState;

pub const RUN_DATE_CONSTRAINT: &str = "batches_run_date_unique";
pub const CHECKPOINT_DATE_CONSTRAINT: &str = "checkpoints_batch_date_unique";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("batch already exists for run date {run_date}")]
    RunDateConflict { run_date: NaiveDate },
    #[error("checkpoint already exists for batch {batch_id} on {checkpoint_date}")]
    CheckpointConflict { batch_id: Uuid, checkpoint_date: NaiveDate },
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),
    #[error("batch {0} not found")]
    BatchNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Transactional writes used by initiation and the daily loop. Uniqueness
/// violations come back as the typed conflict variants.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Batch, its picks and the initial checkpoint (with metrics) in one transaction.
    async fn create_batch(
        &self,
        batch: &NewBatchModel,
        picks: &[NewPickModel],
        initial_checkpoint: &NewCheckpointModel,
    ) -> Result<CreatedBatch, StoreError>;

    /// Checkpoint plus its metrics in one transaction. Returns the checkpoint id.
    async fn create_checkpoint(&self, checkpoint: &NewCheckpointModel) -> Result<Uuid, StoreError>;

    async fn update_batch_status(&self, batch_id: Uuid, status: BatchStatus) -> Result<(), StoreError>;

    async fn load_loop_progress(&self, batch_id: Uuid) -> Result<Option<u32>, StoreError>;

    async fn save_loop_progress(&self, state: &WeeklyPickState, next_day: u32) -> Result<(), StoreError>;
}
