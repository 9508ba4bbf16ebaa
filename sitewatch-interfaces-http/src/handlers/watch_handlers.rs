use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use sitewatch_application::commands::watch_commands::{
    self, FlagUserRequest, UpdateWatchEntryRequest,
};
use sitewatch_application::queries::watch_queries::{self, WatchListPage};
use sitewatch_application::AppState;
use sitewatch_domain::WatchEntry;

use crate::error::HttpError;
use crate::middleware::{acting_admin, authorize};

#[derive(serde::Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(serde::Deserialize)]
pub struct RecentAlertsQuery {
    pub hours: Option<u64>,
}

pub async fn list_watchlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<WatchListPage>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let page = query.page.unwrap_or(1);
    let page_size = query.page_size.unwrap_or(20);
    let result = watch_queries::list_watchlist(&state, page, page_size).await?;
    Ok(Json(result))
}

pub async fn flag_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<FlagUserRequest>,
) -> Result<(StatusCode, Json<WatchEntry>), HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let admin = acting_admin(&headers);
    let entry = watch_commands::flag_user(&state, admin, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_watch_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
    Json(payload): Json<UpdateWatchEntryRequest>,
) -> Result<Json<WatchEntry>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let entry = watch_commands::update_watch_entry(&state, user_id, payload).await?;
    Ok(Json(entry))
}

pub async fn unflag_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<u64>,
) -> Result<StatusCode, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    watch_commands::unflag_user(&state, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recent_alerts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RecentAlertsQuery>,
) -> Result<Json<Vec<WatchEntry>>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let entries = watch_queries::recent_alerts(&state, query.hours.unwrap_or(24)).await?;
    Ok(Json(entries))
}
