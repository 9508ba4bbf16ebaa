mod clickhouse;
mod memory;

pub use clickhouse::ClickhouseRepo;
pub use memory::{
    AlwaysReady, InMemoryActivityLogStore, InMemoryUserDirectory, InMemoryWatchListStore,
};
