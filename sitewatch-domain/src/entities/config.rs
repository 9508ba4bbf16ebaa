use crate::services::RuleThresholds;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    pub scan_interval_seconds: u64,
    pub activity_lookback_hours: u64,
    pub alert_buffer: usize,
    pub hub_buffer: usize,
    pub user_page_size: u64,
    pub request_timeout_seconds: u64,
    pub thresholds: RuleThresholds,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3950".to_string(),
            api_token: None,
            scan_interval_seconds: 30,
            activity_lookback_hours: 24,
            alert_buffer: 100,
            hub_buffer: 10,
            user_page_size: 1000,
            request_timeout_seconds: 15,
            thresholds: RuleThresholds::default(),
        }
    }
}
