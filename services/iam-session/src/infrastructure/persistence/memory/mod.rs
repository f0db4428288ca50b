//! 内存实现（单实例部署与测试）

mod attempt_counter_repository;
mod revocation_repository;
mod security_event_repository;
mod session_repository;

pub use attempt_counter_repository::InMemoryAttemptCounterRepository;
pub use revocation_repository::InMemoryRevocationRepository;
pub use security_event_repository::InMemorySecurityEventRepository;
pub use session_repository::InMemorySessionRepository;
