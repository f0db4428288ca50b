//! 服务错误定义

use aegis_auth_core::TokenError;
use aegis_errors::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Token malformed: {0}")]
    TokenMalformed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Session not found")]
    SessionNotFound,

    /// 会话数超限，由淘汰最久未活动的会话在内部消化，不会返回给调用方
    #[error("Session limit exceeded")]
    SessionLimitExceeded,

    #[error("Refresh token replay detected")]
    ReplayDetected,

    #[error(transparent)]
    Infrastructure(#[from] AppError),
}

impl AuthError {
    /// 是否为认证失败（对终端用户统一显示）
    pub fn is_auth_failure(&self) -> bool {
        !matches!(self, Self::Infrastructure(_))
    }

    /// 指标 / 日志里使用的短标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountLocked => "account_locked",
            Self::AccountDisabled => "account_disabled",
            Self::TokenMalformed(_) => "token_malformed",
            Self::TokenExpired => "token_expired",
            Self::TokenRevoked => "token_revoked",
            Self::SessionNotFound => "session_not_found",
            Self::SessionLimitExceeded => "session_limit_exceeded",
            Self::ReplayDetected => "replay_detected",
            Self::Infrastructure(_) => "infrastructure",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(msg) => AuthError::TokenMalformed(msg),
            TokenError::Expired => AuthError::TokenExpired,
            other => AuthError::Infrastructure(other.into()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Infrastructure(inner) => inner,
            _ => AppError::unauthenticated("Authentication failed"),
        }
    }
}

pub type AuthServiceResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_undifferentiated() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::AccountLocked,
            AuthError::TokenRevoked,
            AuthError::ReplayDetected,
            AuthError::TokenMalformed("bad signature".to_string()),
        ] {
            let app: AppError = err.into();
            assert_eq!(app.to_string(), "Unauthenticated: Authentication failed");
        }
    }

    #[test]
    fn test_infrastructure_errors_keep_their_kind() {
        let app: AppError =
            AuthError::Infrastructure(AppError::timeout("session.find_by_id")).into();
        assert!(matches!(app, AppError::Timeout(_)));
        assert!(!AuthError::Infrastructure(AppError::internal("x")).is_auth_failure());
    }

    #[test]
    fn test_token_errors_map_to_auth_kinds() {
        assert!(matches!(AuthError::from(TokenError::Expired), AuthError::TokenExpired));
        assert!(matches!(
            AuthError::from(TokenError::Malformed("x".into())),
            AuthError::TokenMalformed(_)
        ));
        assert!(matches!(
            AuthError::from(TokenError::Signing("x".into())),
            AuthError::Infrastructure(AppError::Internal(_))
        ));
    }
}
