//! 实体

mod login_attempt;
mod revoked_token;
mod security_event;
mod session;

pub use login_attempt::*;
pub use revoked_token::*;
pub use security_event::*;
pub use session::*;
