//! 应用层

mod coordinator;
mod dto;

pub use coordinator::*;
pub use dto::*;
