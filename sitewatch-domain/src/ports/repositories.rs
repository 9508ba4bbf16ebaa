use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{ActivityRecord, UserAccount, WatchEntry};

/// Read-only view of the platform's user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_active_users(
        &self,
        page: u64,
        page_size: u64,
    ) -> anyhow::Result<(Vec<UserAccount>, u64)>;
    async fn get_user(&self, id: u64) -> anyhow::Result<Option<UserAccount>>;
}

/// Read-only view of the platform's audit trail.
#[async_trait]
pub trait ActivityLogStore: Send + Sync {
    async fn fetch_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u64,
        page_size: u64,
    ) -> anyhow::Result<(Vec<ActivityRecord>, u64)>;

    /// One user's records newer than `since`. The scan loop calls this once
    /// per user per cycle, so it must not page through unrelated history.
    async fn fetch_for_user_since(
        &self,
        user_id: u64,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ActivityRecord>>;
}

#[async_trait]
pub trait WatchListStore: Send + Sync {
    async fn get(&self, user_id: u64) -> anyhow::Result<Option<WatchEntry>>;
    async fn list(&self, page: u64, page_size: u64) -> anyhow::Result<(Vec<WatchEntry>, u64)>;
    async fn create(&self, entry: &WatchEntry) -> anyhow::Result<()>;
    async fn update(&self, entry: &WatchEntry) -> anyhow::Result<()>;
    async fn delete(&self, user_id: u64) -> anyhow::Result<()>;
    /// Bumps alert_count and last_alert_at in one atomic statement.
    /// Two-step read-modify-write here would lose updates under
    /// concurrent alerts for the same user.
    async fn increment_alert(&self, user_id: u64, at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn recent_alerts(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<WatchEntry>>;
}
