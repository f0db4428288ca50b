//! aegis-adapter-redis - Redis 适配器

mod connection;
mod script;

pub use connection::*;
pub use script::*;
