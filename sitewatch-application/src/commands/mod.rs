pub mod watch_commands;
