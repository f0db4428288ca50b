//! 令牌错误

use aegis_errors::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    /// 签名错误、格式错误、类型不符
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(_) | TokenError::Expired => {
                AppError::unauthenticated(err.to_string())
            }
            TokenError::InvalidKey(_) | TokenError::Signing(_) => {
                AppError::internal(err.to_string())
            }
        }
    }
}
