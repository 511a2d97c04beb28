pub mod batches;
pub mod picks;
pub mod checkpoints;
pub mod pick_checkpoint_metrics;
pub mod loop_progress;

use thiserror::Error;

/// A TEXT enum column held a value the code does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
