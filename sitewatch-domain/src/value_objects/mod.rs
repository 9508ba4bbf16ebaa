mod role;
mod severity;

pub use role::Role;
pub use severity::Severity;
