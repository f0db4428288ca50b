//! 安全审计日志

use std::sync::Arc;

use aegis_common::UserId;
use aegis_errors::AppResult;

use super::StoreDeadline;
use crate::domain::entities::{RiskLevel, SecurityEvent};
use crate::domain::repositories::SecurityEventRepository;

/// 只追加的安全事件日志，同时镜像到 tracing
#[derive(Clone)]
pub struct SecurityEventLog {
    repo: Arc<dyn SecurityEventRepository>,
    deadline: StoreDeadline,
}

impl SecurityEventLog {
    pub fn new(repo: Arc<dyn SecurityEventRepository>, deadline: StoreDeadline) -> Self {
        Self { repo, deadline }
    }

    pub async fn append(&self, event: SecurityEvent) -> AppResult<()> {
        let user_id = event.user_id.map(|id| id.to_string()).unwrap_or_default();
        let session_id = event.session_id.map(|id| id.to_string()).unwrap_or_default();
        let ip_address = event.ip_address.as_deref().unwrap_or_default();

        match event.risk_level {
            RiskLevel::Info => tracing::info!(
                event_type = %event.event_type,
                user_id = %user_id,
                session_id = %session_id,
                ip_address,
                detail = %event.detail,
                "Security event"
            ),
            RiskLevel::Warning | RiskLevel::High => tracing::warn!(
                event_type = %event.event_type,
                risk_level = %event.risk_level,
                user_id = %user_id,
                session_id = %session_id,
                ip_address,
                detail = %event.detail,
                "Security event"
            ),
            RiskLevel::Critical => tracing::error!(
                event_type = %event.event_type,
                user_id = %user_id,
                session_id = %session_id,
                ip_address,
                detail = %event.detail,
                "Critical security event"
            ),
        }

        metrics::counter!("auth_security_events_total", "risk" => event.risk_level.as_str())
            .increment(1);

        self.deadline
            .run("security_event.append", self.repo.append(&event))
            .await
    }

    /// 用户最近的事件（新的在前）
    pub async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SecurityEvent>> {
        self.deadline
            .run(
                "security_event.find_by_user_id",
                self.repo.find_by_user_id(user_id, limit),
            )
            .await
    }
}
