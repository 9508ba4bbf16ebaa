// Activity log entities
// One record per audited user action, as written by the platform's audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Create,
    Read,
    Update,
    Delete,
    Login,
    Logout,
    Register,
}

impl ActionKind {
    pub fn is_mutation(&self) -> bool {
        matches!(self, ActionKind::Update | ActionKind::Delete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "CREATE",
            ActionKind::Read => "READ",
            ActionKind::Update => "UPDATE",
            ActionKind::Delete => "DELETE",
            ActionKind::Login => "LOGIN",
            ActionKind::Logout => "LOGOUT",
            ActionKind::Register => "REGISTER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATE" => Some(ActionKind::Create),
            "READ" => Some(ActionKind::Read),
            "UPDATE" => Some(ActionKind::Update),
            "DELETE" => Some(ActionKind::Delete),
            "LOGIN" => Some(ActionKind::Login),
            "LOGOUT" => Some(ActionKind::Logout),
            "REGISTER" => Some(ActionKind::Register),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKind {
    Worker,
    Project,
    User,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Worker => "WORKER",
            TargetKind::Project => "PROJECT",
            TargetKind::User => "USER",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "WORKER" => Some(TargetKind::Worker),
            "PROJECT" => Some(TargetKind::Project),
            "USER" => Some(TargetKind::User),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    pub user_id: u64,
    pub username: String,
    pub action: ActionKind,
    pub target: TargetKind,
    pub target_id: Option<u64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
