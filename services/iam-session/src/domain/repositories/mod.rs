//! 仓储接口

mod attempt_counter_repository;
mod credential_store;
mod revocation_repository;
mod security_event_repository;
mod session_repository;

pub use attempt_counter_repository::*;
pub use credential_store::*;
pub use revocation_repository::*;
pub use security_event_repository::*;
pub use session_repository::*;
