// Sitewatch Application Layer

pub mod commands;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod monitor;
pub mod queries;
pub mod service;
pub mod state;

pub use error::AppError;
pub use metrics::Metrics;
pub use service::MonitoringService;
pub use state::AppState;
