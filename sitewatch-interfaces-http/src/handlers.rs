pub mod ops_handlers;
pub mod stream_handlers;
pub mod watch_handlers;

pub use ops_handlers::*;
pub use stream_handlers::*;
pub use watch_handlers::*;
