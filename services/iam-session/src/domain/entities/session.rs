//! 会话实体

use aegis_common::{SessionId, TokenId, UserId};
use aegis_errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::RevocationReason;

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    Logout,
    PasswordChange,
    Suspicious,
    AccountDisabled,
    /// 超出每用户会话上限被淘汰
    Evicted,
    /// 用户在其他设备上注销该会话
    RemoteSignOut,
    /// 登录在会话落库之后失败，会话从未交给客户端
    Aborted,
    Expired,
}

impl SessionEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::PasswordChange => "password_change",
            Self::Suspicious => "suspicious",
            Self::AccountDisabled => "account_disabled",
            Self::Evicted => "evicted",
            Self::RemoteSignOut => "remote_sign_out",
            Self::Aborted => "aborted",
            Self::Expired => "expired",
        }
    }

    /// 会话结束时其令牌的吊销原因
    pub fn revocation_reason(&self) -> RevocationReason {
        match self {
            Self::Logout => RevocationReason::Logout,
            Self::PasswordChange => RevocationReason::PasswordChange,
            Self::Suspicious => RevocationReason::Suspicious,
            Self::AccountDisabled => RevocationReason::AccountDisabled,
            Self::Evicted | Self::RemoteSignOut | Self::Aborted => RevocationReason::Revoked,
            Self::Expired => RevocationReason::Expired,
        }
    }
}

impl fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionEndReason {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logout" => Ok(Self::Logout),
            "password_change" => Ok(Self::PasswordChange),
            "suspicious" => Ok(Self::Suspicious),
            "account_disabled" => Ok(Self::AccountDisabled),
            "evicted" => Ok(Self::Evicted),
            "remote_sign_out" => Ok(Self::RemoteSignOut),
            "aborted" => Ok(Self::Aborted),
            "expired" => Ok(Self::Expired),
            other => Err(AppError::internal(format!("Unknown session end reason: {}", other))),
        }
    }
}

/// 会话生命周期状态
///
/// `Expired` 与 `Revoked` 是终态，新的登录总是创建新会话。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Expired,
    Revoked(SessionEndReason),
}

/// 新会话参数
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub token_id: TokenId,
    pub access_token_id: TokenId,
    pub device_fingerprint: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
}

/// 会话实体
///
/// `token_id` 是当前有效刷新令牌的 `jti`，每次刷新轮换；`access_token_id` 是与之配对的访问令牌。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub token_id: TokenId,
    pub access_token_id: TokenId,
    pub device_fingerprint: String,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_expires_at: DateTime<Utc>,
    pub active: bool,
    pub end_reason: Option<SessionEndReason>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn open(new: NewSession, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id,
            user_id: new.user_id,
            token_id: new.token_id,
            access_token_id: new.access_token_id,
            device_fingerprint: new.device_fingerprint,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            created_at: now,
            last_activity: now,
            expires_at: new.expires_at,
            access_expires_at: new.access_expires_at,
            active: true,
            end_reason: None,
            ended_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_round_trips_through_str() {
        for reason in [
            SessionEndReason::Logout,
            SessionEndReason::PasswordChange,
            SessionEndReason::Suspicious,
            SessionEndReason::AccountDisabled,
            SessionEndReason::Evicted,
            SessionEndReason::RemoteSignOut,
            SessionEndReason::Aborted,
            SessionEndReason::Expired,
        ] {
            assert_eq!(reason.as_str().parse::<SessionEndReason>().unwrap(), reason);
        }
        assert!("bogus".parse::<SessionEndReason>().is_err());
    }

    #[test]
    fn test_eviction_revokes_with_generic_reason() {
        assert_eq!(
            SessionEndReason::Evicted.revocation_reason(),
            RevocationReason::Revoked
        );
        assert_eq!(
            SessionEndReason::Aborted.revocation_reason(),
            RevocationReason::Revoked
        );
        assert_eq!(
            SessionEndReason::PasswordChange.revocation_reason(),
            RevocationReason::PasswordChange
        );
    }
}
