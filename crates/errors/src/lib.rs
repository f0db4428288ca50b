//! aegis-errors - 统一错误处理
//!
//! 仓储与适配器统一返回 `AppResult`；认证失败在边界上被折叠成 `Unauthenticated`，
//! 不向调用方透露具体原因。

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    /// 存储调用超时，调用方必须拒绝请求
    #[error("Timed out: {0}")]
    Timeout(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 存储、网络或超时类故障
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Internal(_) | Self::Database(_) | Self::ExternalService(_) | Self::Timeout(_)
        )
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Unauthenticated(_) => 401,
            Self::Conflict(_) => 409,
            Self::Internal(_) | Self::Database(_) => 500,
            Self::ExternalService(_) => 502,
            Self::Timeout(_) => 503,
        }
    }

    /// 转换为 gRPC 状态码
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            Self::NotFound(_) => tonic::Code::NotFound,
            Self::Validation(_) => tonic::Code::InvalidArgument,
            Self::Unauthenticated(_) => tonic::Code::Unauthenticated,
            Self::Conflict(_) => tonic::Code::AlreadyExists,
            Self::Internal(_) | Self::Database(_) => tonic::Code::Internal,
            Self::ExternalService(_) | Self::Timeout(_) => tonic::Code::Unavailable,
        }
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        tonic::Status::new(err.grpc_code(), err.to_string())
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_unavailable() {
        let err = AppError::timeout("session.find_by_id");
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.grpc_code(), tonic::Code::Unavailable);
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_auth_errors_map_to_unauthenticated() {
        let status: tonic::Status = AppError::unauthenticated("Authentication failed").into();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
        assert_eq!(status.message(), "Unauthenticated: Authentication failed");
        assert!(!AppError::unauthenticated("x").is_infrastructure());
    }

    #[test]
    fn test_conflict_is_not_infrastructure() {
        let err = AppError::conflict("session already exists");
        assert_eq!(err.status_code(), 409);
        assert!(!err.is_infrastructure());
    }
}
