pub mod calendar;
pub mod clock;
pub mod daily_loop;
pub mod error;
pub mod evaluator;
pub mod state;

pub use error::CheckpointError;
pub use state::{PickState, WeeklyPickState};
