// Manual watch-list administration. These run beside the automatic
// pipeline; atomicity of concurrent edits rests on the store's
// single-statement increment, so updates here only touch notes and
// severity.

use chrono::Utc;
use serde::Deserialize;
use tracing::error;

use sitewatch_domain::{Severity, WatchEntry};

use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct FlagUserRequest {
    pub user_id: u64,
    pub reason: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub severity: Option<Severity>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWatchEntryRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// Admin identity taken from the authenticated request.
#[derive(Debug, Clone)]
pub struct ActingAdmin {
    pub id: u64,
    pub username: String,
}

pub async fn flag_user(
    state: &AppState,
    admin: ActingAdmin,
    request: FlagUserRequest,
) -> Result<WatchEntry, AppError> {
    if request.reason.trim().is_empty() {
        return Err(AppError::BadRequest("reason must not be empty".to_string()));
    }

    let user = state
        .user_directory
        .get_user(request.user_id)
        .await
        .map_err(|err| {
            error!("failed to look up user: {}", err);
            AppError::Internal(err)
        })?
        .ok_or(AppError::NotFound)?;

    let existing = state.watch_store.get(user.id).await.map_err(|err| {
        error!("failed to look up watch entry: {}", err);
        AppError::Internal(err)
    })?;
    if existing.is_some() {
        return Err(AppError::Conflict(
            "user is already on the watch list".to_string(),
        ));
    }

    let now = Utc::now();
    let entry = WatchEntry {
        user_id: user.id,
        username: user.username,
        reason: request.reason,
        severity: request.severity.unwrap_or(Severity::Medium),
        added_by: Some(admin.id),
        added_by_name: Some(admin.username),
        first_detected_at: now,
        last_alert_at: now,
        alert_count: 1,
        notes: request.notes,
    };

    state.watch_store.create(&entry).await.map_err(|err| {
        error!("failed to create watch entry: {}", err);
        AppError::Internal(err)
    })?;
    state.monitoring.flag_user(entry.user_id).await;
    Ok(entry)
}

pub async fn unflag_user(state: &AppState, user_id: u64) -> Result<(), AppError> {
    state
        .watch_store
        .get(user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::NotFound)?;

    state.watch_store.delete(user_id).await.map_err(|err| {
        error!("failed to delete watch entry: {}", err);
        AppError::Internal(err)
    })?;
    state.monitoring.unflag_user(user_id).await;
    Ok(())
}

pub async fn update_watch_entry(
    state: &AppState,
    user_id: u64,
    request: UpdateWatchEntryRequest,
) -> Result<WatchEntry, AppError> {
    let mut entry = state
        .watch_store
        .get(user_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::NotFound)?;

    if let Some(notes) = request.notes {
        entry.notes = notes;
    }
    if let Some(severity) = request.severity {
        entry.severity = severity;
    }

    state.watch_store.update(&entry).await.map_err(|err| {
        error!("failed to update watch entry: {}", err);
        AppError::Internal(err)
    })?;
    Ok(entry)
}
