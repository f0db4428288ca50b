//! JWT Claims

use aegis_common::{SessionId, TokenId, UserId};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::TokenError;

/// 令牌类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT Claims
///
/// 载荷只包含身份声明，不携带任何密钥材料。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Session ID
    pub sid: String,
    /// JWT ID
    pub jti: String,
    /// Token type
    pub typ: TokenKind,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        UserId::from_string(&self.sub)
            .map_err(|_| TokenError::Malformed("Invalid user ID in token".to_string()))
    }

    pub fn session_id(&self) -> Result<SessionId, TokenError> {
        SessionId::from_string(&self.sid)
            .map_err(|_| TokenError::Malformed("Invalid session ID in token".to_string()))
    }

    pub fn token_id(&self) -> Result<TokenId, TokenError> {
        TokenId::from_string(&self.jti)
            .map_err(|_| TokenError::Malformed("Token ID (jti) missing or invalid".to_string()))
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn is_access_token(&self) -> bool {
        self.typ == TokenKind::Access
    }

    pub fn is_refresh_token(&self) -> bool {
        self.typ == TokenKind::Refresh
    }
}
