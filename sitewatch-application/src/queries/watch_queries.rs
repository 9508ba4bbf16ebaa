use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::error;

use sitewatch_domain::WatchEntry;

use crate::{AppError, AppState};

#[derive(Debug, Serialize)]
pub struct WatchListPage {
    pub data: Vec<WatchEntry>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

pub async fn list_watchlist(
    state: &AppState,
    page: u64,
    page_size: u64,
) -> Result<WatchListPage, AppError> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, 100);
    let (data, total) = state
        .watch_store
        .list(page, page_size)
        .await
        .map_err(|err| {
            error!("failed to list watch entries: {}", err);
            AppError::Internal(err)
        })?;
    Ok(WatchListPage {
        data,
        total,
        page,
        page_size,
    })
}

pub async fn recent_alerts(state: &AppState, hours: u64) -> Result<Vec<WatchEntry>, AppError> {
    let hours = if hours == 0 { 24 } else { hours };
    let since = Utc::now() - Duration::hours(hours as i64);
    state.watch_store.recent_alerts(since).await.map_err(|err| {
        error!("failed to fetch recent alerts: {}", err);
        AppError::Internal(err)
    })
}
