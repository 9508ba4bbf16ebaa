use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use sitewatch_application::{AppState, Metrics, MonitoringService};
use sitewatch_domain::{ActivityLogStore, HealthProbe, UserDirectory, WatchListStore};
use sitewatch_infrastructure::{
    AlwaysReady, AppConfig, ClickhouseRepo, InMemoryActivityLogStore, InMemoryUserDirectory,
    InMemoryWatchListStore,
};

pub struct AppContext {
    pub state: AppState,
}

impl AppContext {
    pub async fn new() -> Result<Self> {
        let config = AppConfig::load().await?;
        let runtime_config = config.to_runtime_config();

        let (user_directory, log_store, watch_store, health): (
            Arc<dyn UserDirectory>,
            Arc<dyn ActivityLogStore>,
            Arc<dyn WatchListStore>,
            Arc<dyn HealthProbe>,
        ) = match config.storage.as_str() {
            "memory" => {
                info!("using in-memory stores");
                (
                    Arc::new(InMemoryUserDirectory::new()),
                    Arc::new(InMemoryActivityLogStore::new()),
                    Arc::new(InMemoryWatchListStore::new()),
                    Arc::new(AlwaysReady),
                )
            }
            _ => {
                let repo = Arc::new(ClickhouseRepo::connect(&config.to_db_config()));
                repo.ensure_schema().await?;
                info!(database = %config.clickhouse_database, "clickhouse schema ready");
                (
                    Arc::clone(&repo) as Arc<dyn UserDirectory>,
                    Arc::clone(&repo) as Arc<dyn ActivityLogStore>,
                    Arc::clone(&repo) as Arc<dyn WatchListStore>,
                    repo,
                )
            }
        };

        let metrics = Arc::new(Metrics::default());
        let monitoring = MonitoringService::start(
            Arc::clone(&user_directory),
            Arc::clone(&log_store),
            Arc::clone(&watch_store),
            &runtime_config,
            Arc::clone(&metrics),
        )
        .await?;

        let state = AppState {
            config: runtime_config,
            user_directory,
            log_store,
            watch_store,
            health,
            monitoring,
            metrics,
        };

        Ok(Self { state })
    }
}
