use dotenvy::dotenv;
use eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use weekly_pick_tracker::config;
use weekly_pick_tracker::db::models::checkpoints::CheckpointStatus;
use weekly_pick_tracker::logging;
use weekly_pick_tracker::picks::FilePickDrafter;
use weekly_pick_tracker::services::{Services, cancel_on_ctrl_c};

/// Usage: initiate_batch [PICKS_FILE]
///
/// Starts this week's batch from a picks file, then runs its daily
/// checkpoints in the foreground until the window closes.
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    if let Err(e) = logging::init_logging(env!("CARGO_BIN_NAME").to_string()) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e);
    }

    let cfg = config::Config::load()?;
    let picks_file = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.picks_file.clone());
    info!(picks_file = %picks_file.display(), benchmark = %cfg.benchmark_symbol, "Configuration loaded and logging initialized");

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let services = Services::init(cfg, cancel).await?;
    let initiator = services.initiator(Arc::new(FilePickDrafter::new(picks_file)));

    let state = initiator.initiate_weekly_batch(chrono::Utc::now()).await?;
    info!(batch_id = %state.batch_id, run_date = %state.run_date, "Batch initiated, starting daily checkpoints");

    match services.checkpoint_loop().run_to_completion(&state).await {
        Ok(summary) => {
            let details = services.db.batch_details(summary.batch_id).await?;
            let computed = details
                .checkpoints
                .iter()
                .filter(|c| c.checkpoint.status().is_ok_and(|s| s == CheckpointStatus::Computed))
                .count();
            info!(
                batch_id = %summary.batch_id,
                cycles = summary.outcomes.len(),
                checkpoints = details.checkpoints.len(),
                computed,
                "Batch completed"
            );
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            warn!(batch_id = %state.batch_id, "Stopped before the window closed; checkpoint_worker will resume it");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
