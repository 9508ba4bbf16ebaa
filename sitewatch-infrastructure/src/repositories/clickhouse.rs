use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};

use sitewatch_domain::{
    ActionKind, ActivityLogStore, ActivityRecord, HealthProbe, Role, Severity, TargetKind,
    UserAccount, UserDirectory, WatchEntry, WatchListStore,
};

use crate::config::DbConfig;

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct UserRow {
    id: u64,
    username: String,
    email: String,
    role: String,
    active: u8,
    last_login_ms: Option<i64>,
}

impl UserRow {
    fn into_entity(self) -> UserAccount {
        UserAccount {
            id: self.id,
            username: self.username,
            email: self.email,
            role: if self.role == "admin" {
                Role::Admin
            } else {
                Role::User
            },
            active: self.active != 0,
            last_login: self.last_login_ms.map(from_millis),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct ActivityRow {
    id: u64,
    user_id: u64,
    username: String,
    action: String,
    target: String,
    target_id: Option<u64>,
    description: String,
    created_at_ms: i64,
}

impl ActivityRow {
    fn into_entity(self) -> Result<ActivityRecord> {
        let action = ActionKind::parse(&self.action)
            .ok_or_else(|| anyhow!("unknown action kind: {}", self.action))?;
        let target = TargetKind::parse(&self.target)
            .ok_or_else(|| anyhow!("unknown target kind: {}", self.target))?;
        Ok(ActivityRecord {
            id: self.id,
            user_id: self.user_id,
            username: self.username,
            action,
            target,
            target_id: self.target_id,
            description: self.description,
            created_at: from_millis(self.created_at_ms),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct WatchEntryRow {
    user_id: u64,
    username: String,
    reason: String,
    severity: String,
    added_by: Option<u64>,
    added_by_name: Option<String>,
    first_detected_at_ms: i64,
    last_alert_at_ms: i64,
    alert_count: u64,
    notes: String,
}

impl WatchEntryRow {
    fn from_entity(entry: &WatchEntry) -> Self {
        Self {
            user_id: entry.user_id,
            username: entry.username.clone(),
            reason: entry.reason.clone(),
            severity: entry.severity.as_str().to_string(),
            added_by: entry.added_by,
            added_by_name: entry.added_by_name.clone(),
            first_detected_at_ms: to_millis(entry.first_detected_at),
            last_alert_at_ms: to_millis(entry.last_alert_at),
            alert_count: entry.alert_count,
            notes: entry.notes.clone(),
        }
    }

    fn into_entity(self) -> WatchEntry {
        WatchEntry {
            user_id: self.user_id,
            username: self.username,
            reason: self.reason,
            severity: Severity::from(self.severity.as_str()),
            added_by: self.added_by,
            added_by_name: self.added_by_name,
            first_detected_at: from_millis(self.first_detected_at_ms),
            last_alert_at: from_millis(self.last_alert_at_ms),
            alert_count: self.alert_count,
            notes: self.notes,
        }
    }
}

const WATCH_COLUMNS: &str = "user_id, username, reason, severity, added_by, added_by_name, \
     first_detected_at_ms, last_alert_at_ms, alert_count, notes";

#[derive(Clone)]
pub struct ClickhouseRepo {
    client: Client,
    database: String,
}

impl ClickhouseRepo {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn connect(config: &DbConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.clickhouse_url)
            .with_database(&config.clickhouse_database);
        if let Some(user) = &config.clickhouse_user {
            client = client.with_user(user);
        }
        if let Some(password) = &config.clickhouse_password {
            client = client.with_password(password);
        }
        Self::new(client, config.clickhouse_database.clone())
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let create_db = format!("CREATE DATABASE IF NOT EXISTS {}", self.database);
        self.client.query(&create_db).execute().await?;

        let create_users = r#"
CREATE TABLE IF NOT EXISTS users (
    id UInt64,
    username String,
    email String,
    role String,
    active UInt8,
    last_login_ms Nullable(Int64)
) ENGINE = MergeTree
ORDER BY id
"#;
        self.client.query(create_users).execute().await?;

        let create_logs = r#"
CREATE TABLE IF NOT EXISTS activity_logs (
    id UInt64,
    user_id UInt64,
    username String,
    action String,
    target String,
    target_id Nullable(UInt64),
    description String,
    created_at_ms Int64
) ENGINE = MergeTree
PARTITION BY toDate(fromUnixTimestamp64Milli(created_at_ms))
ORDER BY (created_at_ms, user_id)
"#;
        self.client.query(create_logs).execute().await?;

        let create_watch = r#"
CREATE TABLE IF NOT EXISTS watch_entries (
    user_id UInt64,
    username String,
    reason String,
    severity String,
    added_by Nullable(UInt64),
    added_by_name Nullable(String),
    first_detected_at_ms Int64,
    last_alert_at_ms Int64,
    alert_count UInt64,
    notes String
) ENGINE = MergeTree
ORDER BY user_id
"#;
        self.client.query(create_watch).execute().await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        let _: u8 = self.client.query("SELECT toUInt8(1)").fetch_one().await?;
        Ok(())
    }
}

#[async_trait]
impl HealthProbe for ClickhouseRepo {
    async fn ping(&self) -> Result<()> {
        ClickhouseRepo::ping(self).await
    }
}

#[async_trait]
impl UserDirectory for ClickhouseRepo {
    async fn list_active_users(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<UserAccount>, u64)> {
        let total: u64 = self
            .client
            .query("SELECT count() FROM users WHERE active = 1")
            .fetch_one()
            .await?;
        let offset = page.saturating_sub(1) * page_size;
        let rows = self
            .client
            .query(
                "SELECT id, username, email, role, active, last_login_ms \
                 FROM users WHERE active = 1 ORDER BY id LIMIT ? OFFSET ?",
            )
            .bind(page_size)
            .bind(offset)
            .fetch_all::<UserRow>()
            .await?;
        Ok((rows.into_iter().map(UserRow::into_entity).collect(), total))
    }

    async fn get_user(&self, id: u64) -> Result<Option<UserAccount>> {
        let row = self
            .client
            .query(
                "SELECT id, username, email, role, active, last_login_ms \
                 FROM users WHERE id = ? LIMIT 1",
            )
            .bind(id)
            .fetch_optional::<UserRow>()
            .await?;
        Ok(row.map(UserRow::into_entity))
    }
}

#[async_trait]
impl ActivityLogStore for ClickhouseRepo {
    async fn fetch_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ActivityRecord>, u64)> {
        let total: u64 = self
            .client
            .query("SELECT count() FROM activity_logs WHERE created_at_ms >= ? AND created_at_ms < ?")
            .bind(to_millis(start))
            .bind(to_millis(end))
            .fetch_one()
            .await?;
        let offset = page.saturating_sub(1) * page_size;
        let rows = self
            .client
            .query(
                "SELECT id, user_id, username, action, target, target_id, description, created_at_ms \
                 FROM activity_logs WHERE created_at_ms >= ? AND created_at_ms < ? \
                 ORDER BY created_at_ms DESC LIMIT ? OFFSET ?",
            )
            .bind(to_millis(start))
            .bind(to_millis(end))
            .bind(page_size)
            .bind(offset)
            .fetch_all::<ActivityRow>()
            .await?;
        let records = rows
            .into_iter()
            .map(ActivityRow::into_entity)
            .collect::<Result<Vec<_>>>()?;
        Ok((records, total))
    }

    async fn fetch_for_user_since(
        &self,
        user_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>> {
        let rows = self
            .client
            .query(
                "SELECT id, user_id, username, action, target, target_id, description, created_at_ms \
                 FROM activity_logs WHERE user_id = ? AND created_at_ms > ? \
                 ORDER BY created_at_ms",
            )
            .bind(user_id)
            .bind(to_millis(since))
            .fetch_all::<ActivityRow>()
            .await?;
        rows.into_iter().map(ActivityRow::into_entity).collect()
    }
}

#[async_trait]
impl WatchListStore for ClickhouseRepo {
    async fn get(&self, user_id: u64) -> Result<Option<WatchEntry>> {
        let query = format!(
            "SELECT {} FROM watch_entries WHERE user_id = ? LIMIT 1",
            WATCH_COLUMNS
        );
        let row = self
            .client
            .query(&query)
            .bind(user_id)
            .fetch_optional::<WatchEntryRow>()
            .await?;
        Ok(row.map(WatchEntryRow::into_entity))
    }

    async fn list(&self, page: u64, page_size: u64) -> Result<(Vec<WatchEntry>, u64)> {
        let total: u64 = self
            .client
            .query("SELECT count() FROM watch_entries")
            .fetch_one()
            .await?;
        let offset = page.saturating_sub(1) * page_size;
        let query = format!(
            "SELECT {} FROM watch_entries ORDER BY last_alert_at_ms DESC LIMIT ? OFFSET ?",
            WATCH_COLUMNS
        );
        let rows = self
            .client
            .query(&query)
            .bind(page_size)
            .bind(offset)
            .fetch_all::<WatchEntryRow>()
            .await?;
        Ok((
            rows.into_iter().map(WatchEntryRow::into_entity).collect(),
            total,
        ))
    }

    async fn create(&self, entry: &WatchEntry) -> Result<()> {
        let mut insert = self.client.insert("watch_entries")?;
        insert.write(&WatchEntryRow::from_entity(entry)).await?;
        insert.end().await?;
        Ok(())
    }

    async fn update(&self, entry: &WatchEntry) -> Result<()> {
        self.client
            .query(
                "ALTER TABLE watch_entries UPDATE \
                 reason = ?, severity = ?, notes = ? \
                 WHERE user_id = ?",
            )
            .bind(entry.reason.as_str())
            .bind(entry.severity.as_str())
            .bind(entry.notes.as_str())
            .bind(entry.user_id)
            .execute()
            .await?;
        Ok(())
    }

    async fn delete(&self, user_id: u64) -> Result<()> {
        self.client
            .query("ALTER TABLE watch_entries DELETE WHERE user_id = ?")
            .bind(user_id)
            .execute()
            .await?;
        Ok(())
    }

    async fn increment_alert(&self, user_id: u64, at: DateTime<Utc>) -> Result<()> {
        // Single statement so concurrent alerts never lose a count.
        self.client
            .query(
                "ALTER TABLE watch_entries UPDATE \
                 alert_count = alert_count + 1, last_alert_at_ms = ? \
                 WHERE user_id = ?",
            )
            .bind(to_millis(at))
            .bind(user_id)
            .execute()
            .await?;
        Ok(())
    }

    async fn recent_alerts(&self, since: DateTime<Utc>) -> Result<Vec<WatchEntry>> {
        let query = format!(
            "SELECT {} FROM watch_entries WHERE last_alert_at_ms >= ? \
             ORDER BY last_alert_at_ms DESC",
            WATCH_COLUMNS
        );
        let rows = self
            .client
            .query(&query)
            .bind(to_millis(since))
            .fetch_all::<WatchEntryRow>()
            .await?;
        Ok(rows.into_iter().map(WatchEntryRow::into_entity).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap();
        assert_eq!(from_millis(to_millis(now)), now);
    }

    #[test]
    fn from_millis_clamps_garbage() {
        assert_eq!(from_millis(i64::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
