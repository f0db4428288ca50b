//! 领域服务

mod lockout_guard;
mod revocation_registry;
mod security_event_log;
mod session_store;
mod store_deadline;
mod suspicious_activity_detector;

pub use lockout_guard::*;
pub use revocation_registry::*;
pub use security_event_log::*;
pub use session_store::*;
pub use store_deadline::*;
pub use suspicious_activity_detector::*;
