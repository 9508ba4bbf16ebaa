mod connections;
mod health;
mod repositories;

pub use connections::{ConnectionSink, ConnectionStream};
pub use health::HealthProbe;
pub use repositories::{ActivityLogStore, UserDirectory, WatchListStore};
