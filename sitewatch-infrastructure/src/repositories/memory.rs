//! In-memory adapters for local development and tests. Same contracts as the
//! ClickHouse repo, backed by tokio locks.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use sitewatch_domain::{
    ActivityLogStore, ActivityRecord, HealthProbe, UserAccount, UserDirectory, WatchEntry,
    WatchListStore,
};

fn page_slice<T: Clone>(items: &[T], page: u64, page_size: u64) -> Vec<T> {
    let offset = (page.saturating_sub(1) * page_size) as usize;
    items
        .iter()
        .skip(offset)
        .take(page_size as usize)
        .cloned()
        .collect()
}

/// Stand-in probe for the in-memory stores, which are always reachable.
pub struct AlwaysReady;

#[async_trait]
impl HealthProbe for AlwaysReady {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<Vec<UserAccount>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserAccount) {
        let mut users = self.users.write().await;
        users.retain(|existing| existing.id != user.id);
        users.push(user);
        users.sort_by_key(|user| user.id);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn list_active_users(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<UserAccount>, u64)> {
        let users = self.users.read().await;
        let active: Vec<UserAccount> = users.iter().filter(|user| user.active).cloned().collect();
        let total = active.len() as u64;
        Ok((page_slice(&active, page, page_size), total))
    }

    async fn get_user(&self, id: u64) -> Result<Option<UserAccount>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|user| user.id == id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryActivityLogStore {
    records: RwLock<Vec<ActivityRecord>>,
}

impl InMemoryActivityLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, record: ActivityRecord) {
        let mut records = self.records.write().await;
        records.push(record);
        records.sort_by_key(|record| record.created_at);
    }
}

#[async_trait]
impl ActivityLogStore for InMemoryActivityLogStore {
    async fn fetch_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ActivityRecord>, u64)> {
        let records = self.records.read().await;
        let mut matched: Vec<ActivityRecord> = records
            .iter()
            .filter(|record| record.created_at >= start && record.created_at < end)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matched.len() as u64;
        Ok((page_slice(&matched, page, page_size), total))
    }

    async fn fetch_for_user_since(
        &self,
        user_id: u64,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| record.user_id == user_id && record.created_at > since)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryWatchListStore {
    entries: RwLock<HashMap<u64, WatchEntry>>,
}

impl InMemoryWatchListStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatchListStore for InMemoryWatchListStore {
    async fn get(&self, user_id: u64) -> Result<Option<WatchEntry>> {
        Ok(self.entries.read().await.get(&user_id).cloned())
    }

    async fn list(&self, page: u64, page_size: u64) -> Result<(Vec<WatchEntry>, u64)> {
        let entries = self.entries.read().await;
        let mut all: Vec<WatchEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| b.last_alert_at.cmp(&a.last_alert_at));
        let total = all.len() as u64;
        Ok((page_slice(&all, page, page_size), total))
    }

    async fn create(&self, entry: &WatchEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.user_id) {
            return Err(anyhow!("watch entry already exists for user {}", entry.user_id));
        }
        entries.insert(entry.user_id, entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &WatchEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        let existing = entries
            .get_mut(&entry.user_id)
            .ok_or_else(|| anyhow!("no watch entry for user {}", entry.user_id))?;
        existing.reason = entry.reason.clone();
        existing.severity = entry.severity;
        existing.notes = entry.notes.clone();
        Ok(())
    }

    async fn delete(&self, user_id: u64) -> Result<()> {
        self.entries.write().await.remove(&user_id);
        Ok(())
    }

    async fn increment_alert(&self, user_id: u64, at: DateTime<Utc>) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&user_id)
            .ok_or_else(|| anyhow!("no watch entry for user {}", user_id))?;
        entry.alert_count += 1;
        entry.last_alert_at = at;
        Ok(())
    }

    async fn recent_alerts(&self, since: DateTime<Utc>) -> Result<Vec<WatchEntry>> {
        let entries = self.entries.read().await;
        let mut recent: Vec<WatchEntry> = entries
            .values()
            .filter(|entry| entry.last_alert_at >= since)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.last_alert_at.cmp(&a.last_alert_at));
        Ok(recent)
    }
}
