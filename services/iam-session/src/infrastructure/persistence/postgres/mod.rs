//! PostgreSQL 实现

mod attempt_counter_repository;
mod revocation_repository;
mod security_event_repository;
mod session_repository;

pub use attempt_counter_repository::PostgresAttemptCounterRepository;
pub use revocation_repository::PostgresRevocationRepository;
pub use security_event_repository::PostgresSecurityEventRepository;
pub use session_repository::PostgresSessionRepository;

use aegis_errors::AppError;

/// 统一的数据库错误包装
pub(crate) fn db_error(action: &str, e: sqlx::Error) -> AppError {
    AppError::database(format!("Failed to {}: {}", action, e))
}
