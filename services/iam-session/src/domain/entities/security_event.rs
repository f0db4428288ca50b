//! 安全事件

use aegis_common::{SessionId, UserId};
use aegis_errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Info,
    Warning,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(AppError::internal(format!("Unknown risk level: {}", other))),
        }
    }
}

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginSucceeded,
    LoginFailed,
    LoginBlocked,
    TwoFactorRequired,
    TwoFactorFailed,
    TokenRefreshed,
    RefreshReplayDetected,
    LoggedOut,
    SessionEvicted,
    SessionRevoked,
    SessionsRevoked,
    SuspiciousActivity,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::LoginBlocked => "login_blocked",
            Self::TwoFactorRequired => "two_factor_required",
            Self::TwoFactorFailed => "two_factor_failed",
            Self::TokenRefreshed => "token_refreshed",
            Self::RefreshReplayDetected => "refresh_replay_detected",
            Self::LoggedOut => "logged_out",
            Self::SessionEvicted => "session_evicted",
            Self::SessionRevoked => "session_revoked",
            Self::SessionsRevoked => "sessions_revoked",
            Self::SuspiciousActivity => "suspicious_activity",
        }
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityEventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login_succeeded" => Ok(Self::LoginSucceeded),
            "login_failed" => Ok(Self::LoginFailed),
            "login_blocked" => Ok(Self::LoginBlocked),
            "two_factor_required" => Ok(Self::TwoFactorRequired),
            "two_factor_failed" => Ok(Self::TwoFactorFailed),
            "token_refreshed" => Ok(Self::TokenRefreshed),
            "refresh_replay_detected" => Ok(Self::RefreshReplayDetected),
            "logged_out" => Ok(Self::LoggedOut),
            "session_evicted" => Ok(Self::SessionEvicted),
            "session_revoked" => Ok(Self::SessionRevoked),
            "sessions_revoked" => Ok(Self::SessionsRevoked),
            "suspicious_activity" => Ok(Self::SuspiciousActivity),
            other => Err(AppError::internal(format!("Unknown security event type: {}", other))),
        }
    }
}

/// 安全事件（只追加，不修改）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
    pub event_type: SecurityEventType,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub risk_level: RiskLevel,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        event_type: SecurityEventType,
        risk_level: RiskLevel,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: None,
            session_id: None,
            event_type,
            ip_address: None,
            user_agent: None,
            risk_level,
            detail: String::new(),
            created_at,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_levels_are_ordered() {
        assert!(RiskLevel::Info < RiskLevel::Warning);
        assert!(RiskLevel::Warning < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_event_builder() {
        let user_id = UserId::new();
        let session_id = SessionId::new();
        let event = SecurityEvent::new(SecurityEventType::LoggedOut, RiskLevel::Info, Utc::now())
            .with_user(user_id)
            .with_session(session_id)
            .with_ip_address("192.168.1.1")
            .with_user_agent(Some("Mozilla/5.0"))
            .with_detail("user logged out");

        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.session_id, Some(session_id));
        assert_eq!(event.ip_address.as_deref(), Some("192.168.1.1"));
        assert_eq!(event.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(event.detail, "user logged out");
    }

    #[test]
    fn test_event_type_round_trips_through_str() {
        let kind = SecurityEventType::RefreshReplayDetected;
        assert_eq!(kind.as_str().parse::<SecurityEventType>().unwrap(), kind);
        assert_eq!("critical".parse::<RiskLevel>().unwrap(), RiskLevel::Critical);
    }
}
