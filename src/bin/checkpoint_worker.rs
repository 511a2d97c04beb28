use dotenvy::dotenv;
use eyre::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use weekly_pick_tracker::checkpoint::calendar::next_weekly_trigger;
use weekly_pick_tracker::checkpoint::clock::{Clock, SystemClock, TokioSleeper, sleep_until};
use weekly_pick_tracker::checkpoint::daily_loop::DailyCheckpointLoop;
use weekly_pick_tracker::checkpoint::state::WeeklyPickState;
use weekly_pick_tracker::config;
use weekly_pick_tracker::logging;
use weekly_pick_tracker::picks::FilePickDrafter;
use weekly_pick_tracker::services::{Services, cancel_on_ctrl_c};

fn spawn_loop(loops: &mut JoinSet<()>, checkpoint_loop: Arc<DailyCheckpointLoop>, state: WeeklyPickState) {
    loops.spawn(async move {
        match checkpoint_loop.run_to_completion(&state).await {
            Ok(summary) => info!(batch_id = %summary.batch_id, cycles = summary.outcomes.len(), "Batch completed"),
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!(batch_id = %state.batch_id, error = %e, "Batch failed"),
        }
    });
}

#[instrument(name = "checkpoint_worker_main")]
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize logging
    if let Err(e) = logging::init_logging(env!("CARGO_BIN_NAME").to_string()) {
        eprintln!("Failed to initialize logging: {}", e);
        return Err(e);
    }

    let cfg = config::Config::load()?;
    info!(benchmark = %cfg.benchmark_symbol, timezone = %cfg.home_timezone, "Configuration loaded and logging initialized");

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let services = Services::init(cfg, cancel.clone()).await?;
    let checkpoint_loop = Arc::new(services.checkpoint_loop());
    let initiator = services.initiator(Arc::new(FilePickDrafter::new(services.config.picks_file.clone())));
    let mut loops = JoinSet::new();

    if let Some(latest) = services.db.latest_batch().await? {
        info!(batch_id = %latest.id, run_date = %latest.run_date, status = %latest.status, "Latest batch on record");
    }

    // Pick up batches interrupted by a previous shutdown
    for (state, next_day) in services.db.resumable_loops().await? {
        info!(batch_id = %state.batch_id, next_day, "Resuming batch");
        spawn_loop(&mut loops, checkpoint_loop.clone(), state);
    }

    let clock = SystemClock;
    loop {
        let trigger = next_weekly_trigger(clock.now(), services.config.home_timezone)?;
        info!(%trigger, "Waiting for next weekly batch");
        if sleep_until(&clock, &TokioSleeper, trigger, &cancel).await.is_err() {
            break;
        }

        match initiator.initiate_weekly_batch(clock.now()).await {
            Ok(state) => {
                info!(batch_id = %state.batch_id, run_date = %state.run_date, "Weekly batch initiated");
                spawn_loop(&mut loops, checkpoint_loop.clone(), state);
            }
            Err(e) => error!(error = ?e, "Weekly batch initiation failed"),
        }

        // Reap finished loops
        while loops.try_join_next().is_some() {}
    }

    info!(running = loops.len(), "Waiting for checkpoint loops to stop");
    while loops.join_next().await.is_some() {}
    Ok(())
}
