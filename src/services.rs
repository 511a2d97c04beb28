use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkpoint::clock::{SystemClock, TokioSleeper};
use crate::checkpoint::daily_loop::DailyCheckpointLoop;
use crate::checkpoint::evaluator::CheckpointEvaluator;
use crate::config::Config;
use crate::db::db_manager::DbManager;
use crate::initiation::WeeklyInitiator;
use crate::market_data::alpha_vantage_client::AlphaVantageClient;
use crate::market_data::fan_out::QuoteFetcher;
use crate::picks::PickDrafter;

/// Production wiring shared by the binaries.
pub struct Services {
    pub config: Config,
    pub db: Arc<DbManager>,
    pub fetcher: Arc<QuoteFetcher>,
    pub cancel: CancellationToken,
}

impl Services {
    pub async fn init(config: Config, cancel: CancellationToken) -> Result<Self> {
        let db = DbManager::init(&config)
            .await
            .wrap_err("Failed to initialize database manager")?;
        info!("Database manager initialized");

        let client = AlphaVantageClient::new(&config)?;
        let fetcher = QuoteFetcher::new(Arc::new(client), config.retry_policy.clone(), cancel.clone());

        Ok(Self {
            config,
            db: Arc::new(db),
            fetcher: Arc::new(fetcher),
            cancel,
        })
    }

    pub fn checkpoint_loop(&self) -> DailyCheckpointLoop {
        let evaluator = CheckpointEvaluator::new(self.fetcher.clone(), self.db.clone(), self.config.home_timezone);
        DailyCheckpointLoop::new(
            Arc::new(evaluator),
            self.db.clone(),
            Arc::new(SystemClock),
            Arc::new(TokioSleeper),
            self.config.home_timezone,
            self.cancel.clone(),
        )
    }

    pub fn initiator(&self, drafter: Arc<dyn PickDrafter>) -> WeeklyInitiator {
        WeeklyInitiator::new(
            drafter,
            self.fetcher.clone(),
            self.db.clone(),
            self.config.benchmark_symbol.clone(),
            self.config.home_timezone,
        )
    }
}

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            token.cancel();
        }
    });
}
