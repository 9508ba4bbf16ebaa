pub mod watch_queries;
