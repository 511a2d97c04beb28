pub mod batches;
pub mod picks;
pub mod checkpoints;
pub mod pick_checkpoint_metrics;
pub mod loop_progress;
