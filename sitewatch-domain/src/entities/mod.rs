mod activity;
mod anomaly;
mod config;
mod user;
mod watch_entry;

pub use activity::{ActionKind, ActivityRecord, TargetKind};
pub use anomaly::{AlertEnvelope, DetectedAnomaly};
pub use config::RuntimeConfig;
pub use user::UserAccount;
pub use watch_entry::WatchEntry;
