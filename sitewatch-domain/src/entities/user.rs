use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: u64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}
