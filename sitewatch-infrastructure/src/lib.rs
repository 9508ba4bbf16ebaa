// Sitewatch Infrastructure Layer

pub mod config;
pub mod repositories;

pub use config::{AppConfig, DbConfig};
pub use repositories::{
    AlwaysReady, ClickhouseRepo, InMemoryActivityLogStore, InMemoryUserDirectory,
    InMemoryWatchListStore,
};
