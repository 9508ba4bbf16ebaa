use std::sync::Arc;

use sitewatch_domain::{
    ActivityLogStore, HealthProbe, RuntimeConfig, UserDirectory, WatchListStore,
};

use crate::service::MonitoringService;
use crate::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub user_directory: Arc<dyn UserDirectory>,
    pub log_store: Arc<dyn ActivityLogStore>,
    pub watch_store: Arc<dyn WatchListStore>,
    pub health: Arc<dyn HealthProbe>,
    pub monitoring: Arc<MonitoringService>,
    pub metrics: Arc<Metrics>,
}
