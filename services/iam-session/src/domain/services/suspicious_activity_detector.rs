//! 可疑活动检测

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::domain::entities::{RiskLevel, Session};

/// 触发风险的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskReason {
    IpChanged,
    UserAgentChanged,
    ResumedAfterInactivity,
}

impl RiskReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IpChanged => "ip address changed",
            Self::UserAgentChanged => "user agent changed",
            Self::ResumedAfterInactivity => "resumed after inactivity",
        }
    }
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 风险评估结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<RiskReason>,
}

impl RiskAssessment {
    pub fn is_elevated(&self) -> bool {
        self.level >= RiskLevel::Warning
    }

    pub fn requires_step_up(&self) -> bool {
        self.level >= RiskLevel::High
    }

    pub fn summary(&self) -> String {
        self.reasons
            .iter()
            .map(RiskReason::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// 可疑活动检测器
///
/// 纯函数，不访问存储，也不改变会话。
#[derive(Debug, Clone, Copy)]
pub struct SuspiciousActivityDetector {
    inactivity_threshold: Duration,
}

impl SuspiciousActivityDetector {
    pub fn new(inactivity_threshold: Duration) -> Self {
        Self { inactivity_threshold }
    }

    /// - 会话记录的 IP 或 User-Agent 与本次请求不同：high
    /// - 距上次活动超过阈值：warning
    pub fn evaluate(
        &self,
        session: &Session,
        ip_address: &str,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let mut reasons = Vec::new();
        let mut level = RiskLevel::Info;

        if !session.ip_address.is_empty() && session.ip_address != ip_address {
            reasons.push(RiskReason::IpChanged);
            level = level.max(RiskLevel::High);
        }

        if let Some(recorded) = session.user_agent.as_deref() {
            if Some(recorded) != user_agent {
                reasons.push(RiskReason::UserAgentChanged);
                level = level.max(RiskLevel::High);
            }
        }

        if now - session.last_activity > self.inactivity_threshold {
            reasons.push(RiskReason::ResumedAfterInactivity);
            level = level.max(RiskLevel::Warning);
        }

        RiskAssessment { level, reasons }
    }
}

impl Default for SuspiciousActivityDetector {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}
