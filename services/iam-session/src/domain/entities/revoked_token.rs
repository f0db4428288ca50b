//! 吊销令牌实体

use aegis_common::{TokenId, UserId};
use aegis_errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 吊销原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Logout,
    PasswordChange,
    Suspicious,
    Expired,
    /// 轮换、淘汰、远程注销
    Revoked,
    AccountDisabled,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::PasswordChange => "password_change",
            Self::Suspicious => "suspicious",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::AccountDisabled => "account_disabled",
        }
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logout" => Ok(Self::Logout),
            "password_change" => Ok(Self::PasswordChange),
            "suspicious" => Ok(Self::Suspicious),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            "account_disabled" => Ok(Self::AccountDisabled),
            other => Err(AppError::internal(format!("Unknown revocation reason: {}", other))),
        }
    }
}

/// 吊销记录
///
/// `expires_at` 是令牌自然过期的时间，过了这个时间记录即可删除。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedToken {
    pub token_id: TokenId,
    pub user_id: UserId,
    pub reason: RevocationReason,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}
