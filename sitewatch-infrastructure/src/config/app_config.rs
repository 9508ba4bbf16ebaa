use std::env;
use std::path::Path;

use anyhow::{anyhow, Result};
use chrono::Duration;
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

use sitewatch_domain::{RuleThresholds, RuntimeConfig};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    /// "clickhouse" for the real stores, "memory" for local development.
    pub storage: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub scan_interval_seconds: u64,
    pub activity_lookback_hours: u64,
    pub alert_buffer: usize,
    pub hub_buffer: usize,
    pub user_page_size: u64,
    pub request_timeout_seconds: u64,
    pub rapid_login_threshold: usize,
    pub rapid_login_window_minutes: u64,
    pub working_hours_start: u32,
    pub working_hours_end: u32,
    pub off_hours_window_minutes: u64,
    pub bulk_mutation_threshold: usize,
    pub bulk_mutation_window_minutes: u64,
    pub scraping_threshold: usize,
    pub scraping_window_minutes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3950".to_string(),
            api_token: None,
            storage: "clickhouse".to_string(),
            clickhouse_url: "http://127.0.0.1:8123".to_string(),
            clickhouse_database: "sitewatch".to_string(),
            clickhouse_user: None,
            clickhouse_password: None,
            scan_interval_seconds: 30,
            activity_lookback_hours: 24,
            alert_buffer: 100,
            hub_buffer: 10,
            user_page_size: 1000,
            request_timeout_seconds: 15,
            rapid_login_threshold: 5,
            rapid_login_window_minutes: 60,
            working_hours_start: 8,
            working_hours_end: 18,
            off_hours_window_minutes: 60,
            bulk_mutation_threshold: 20,
            bulk_mutation_window_minutes: 15,
            scraping_threshold: 10,
            scraping_window_minutes: 10,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var("SITEWATCH_CONFIG").unwrap_or_else(|_| "./config.toml".to_string());
        let file_path = Path::new(&path);
        if !file_path.exists() {
            warn!("config.toml not found, using defaults");
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config.normalize();
            config.validate()?;
            return Ok(config);
        }
        let content = fs::read_to_string(file_path).await?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn normalize(&mut self) {
        if let Some(api_token) = &self.api_token {
            if api_token.trim().is_empty() {
                self.api_token = None;
            }
        }
        if let Some(user) = &self.clickhouse_user {
            if user.trim().is_empty() {
                self.clickhouse_user = None;
            }
        }
        if let Some(password) = &self.clickhouse_password {
            if password.trim().is_empty() {
                self.clickhouse_password = None;
            }
        }
        self.storage = self.storage.trim().to_lowercase();
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        if !matches!(self.storage.as_str(), "clickhouse" | "memory") {
            return Err(anyhow!("storage must be 'clickhouse' or 'memory'"));
        }
        if self.scan_interval_seconds == 0 {
            return Err(anyhow!("scan_interval_seconds must be greater than 0"));
        }
        if self.alert_buffer == 0 || self.hub_buffer == 0 {
            return Err(anyhow!("alert_buffer and hub_buffer must be greater than 0"));
        }
        if self.working_hours_start > 23 || self.working_hours_end > 23 {
            return Err(anyhow!("working hours out of range"));
        }
        if self.working_hours_start >= self.working_hours_end {
            return Err(anyhow!("working_hours_start must precede working_hours_end"));
        }
        if self.rapid_login_threshold == 0
            || self.bulk_mutation_threshold == 0
            || self.scraping_threshold == 0
        {
            return Err(anyhow!("rule thresholds must be greater than 0"));
        }
        Ok(())
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            api_token: self.api_token.clone(),
            scan_interval_seconds: self.scan_interval_seconds,
            activity_lookback_hours: self.activity_lookback_hours,
            alert_buffer: self.alert_buffer,
            hub_buffer: self.hub_buffer,
            user_page_size: self.user_page_size,
            request_timeout_seconds: self.request_timeout_seconds,
            thresholds: RuleThresholds {
                rapid_login_threshold: self.rapid_login_threshold,
                rapid_login_window: Duration::minutes(self.rapid_login_window_minutes as i64),
                working_hours_start: self.working_hours_start,
                working_hours_end: self.working_hours_end,
                off_hours_window: Duration::minutes(self.off_hours_window_minutes as i64),
                bulk_mutation_threshold: self.bulk_mutation_threshold,
                bulk_mutation_window: Duration::minutes(self.bulk_mutation_window_minutes as i64),
                scraping_threshold: self.scraping_threshold,
                scraping_window: Duration::minutes(self.scraping_window_minutes as i64),
            },
        }
    }

    pub fn to_db_config(&self) -> DbConfig {
        DbConfig {
            clickhouse_url: self.clickhouse_url.clone(),
            clickhouse_database: self.clickhouse_database.clone(),
            clickhouse_user: self.clickhouse_user.clone(),
            clickhouse_password: self.clickhouse_password.clone(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("SITEWATCH_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Ok(value) = env::var("SITEWATCH_API_TOKEN") {
            self.api_token = Some(value);
        }
        if let Ok(value) = env::var("SITEWATCH_STORAGE") {
            self.storage = value;
        }
        if let Ok(value) = env::var("SITEWATCH_CLICKHOUSE_URL") {
            self.clickhouse_url = value;
        }
        if let Ok(value) = env::var("SITEWATCH_CLICKHOUSE_DATABASE") {
            self.clickhouse_database = value;
        }
        if let Ok(value) = env::var("SITEWATCH_CLICKHOUSE_USER") {
            self.clickhouse_user = Some(value);
        }
        if let Ok(value) = env::var("SITEWATCH_CLICKHOUSE_PASSWORD") {
            self.clickhouse_password = Some(value);
        }
        if let Ok(value) = env::var("SITEWATCH_SCAN_INTERVAL_SECONDS") {
            self.scan_interval_seconds = value.parse().unwrap_or(self.scan_interval_seconds);
        }
        if let Ok(value) = env::var("SITEWATCH_ACTIVITY_LOOKBACK_HOURS") {
            self.activity_lookback_hours = value.parse().unwrap_or(self.activity_lookback_hours);
        }
        if let Ok(value) = env::var("SITEWATCH_ALERT_BUFFER") {
            self.alert_buffer = value.parse().unwrap_or(self.alert_buffer);
        }
        if let Ok(value) = env::var("SITEWATCH_HUB_BUFFER") {
            self.hub_buffer = value.parse().unwrap_or(self.hub_buffer);
        }
        if let Ok(value) = env::var("SITEWATCH_USER_PAGE_SIZE") {
            self.user_page_size = value.parse().unwrap_or(self.user_page_size);
        }
        if let Ok(value) = env::var("SITEWATCH_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = value.parse().unwrap_or(self.request_timeout_seconds);
        }
        if let Ok(value) = env::var("SITEWATCH_RAPID_LOGIN_THRESHOLD") {
            self.rapid_login_threshold = value.parse().unwrap_or(self.rapid_login_threshold);
        }
        if let Ok(value) = env::var("SITEWATCH_RAPID_LOGIN_WINDOW_MINUTES") {
            self.rapid_login_window_minutes =
                value.parse().unwrap_or(self.rapid_login_window_minutes);
        }
        if let Ok(value) = env::var("SITEWATCH_WORKING_HOURS_START") {
            self.working_hours_start = value.parse().unwrap_or(self.working_hours_start);
        }
        if let Ok(value) = env::var("SITEWATCH_WORKING_HOURS_END") {
            self.working_hours_end = value.parse().unwrap_or(self.working_hours_end);
        }
        if let Ok(value) = env::var("SITEWATCH_OFF_HOURS_WINDOW_MINUTES") {
            self.off_hours_window_minutes =
                value.parse().unwrap_or(self.off_hours_window_minutes);
        }
        if let Ok(value) = env::var("SITEWATCH_BULK_MUTATION_THRESHOLD") {
            self.bulk_mutation_threshold = value.parse().unwrap_or(self.bulk_mutation_threshold);
        }
        if let Ok(value) = env::var("SITEWATCH_BULK_MUTATION_WINDOW_MINUTES") {
            self.bulk_mutation_window_minutes = value
                .parse()
                .unwrap_or(self.bulk_mutation_window_minutes);
        }
        if let Ok(value) = env::var("SITEWATCH_SCRAPING_THRESHOLD") {
            self.scraping_threshold = value.parse().unwrap_or(self.scraping_threshold);
        }
        if let Ok(value) = env::var("SITEWATCH_SCRAPING_WINDOW_MINUTES") {
            self.scraping_window_minutes = value.parse().unwrap_or(self.scraping_window_minutes);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
}
