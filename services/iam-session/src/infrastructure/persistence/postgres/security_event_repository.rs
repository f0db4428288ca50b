//! PostgreSQL 安全事件仓储

use aegis_common::{SessionId, UserId};
use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::db_error;
use crate::domain::entities::{RiskLevel, SecurityEvent, SecurityEventType};
use crate::domain::repositories::SecurityEventRepository;

#[derive(Debug, sqlx::FromRow)]
struct SecurityEventRow {
    id: Uuid,
    user_id: Option<Uuid>,
    session_id: Option<Uuid>,
    event_type: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    risk_level: String,
    detail: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SecurityEventRow> for SecurityEvent {
    type Error = aegis_errors::AppError;

    fn try_from(row: SecurityEventRow) -> Result<Self, Self::Error> {
        Ok(SecurityEvent {
            id: row.id,
            user_id: row.user_id.map(UserId::from),
            session_id: row.session_id.map(SessionId::from),
            event_type: row.event_type.parse::<SecurityEventType>()?,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            risk_level: row.risk_level.parse::<RiskLevel>()?,
            detail: row.detail,
            created_at: row.created_at,
        })
    }
}

pub struct PostgresSecurityEventRepository {
    pool: PgPool,
}

impl PostgresSecurityEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecurityEventRepository for PostgresSecurityEventRepository {
    async fn append(&self, event: &SecurityEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO security_events (id, user_id, session_id, event_type, ip_address,
                                         user_agent, risk_level, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(event.user_id.map(|id| id.0))
        .bind(event.session_id.map(|id| id.0))
        .bind(event.event_type.as_str())
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(event.risk_level.as_str())
        .bind(&event.detail)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("append security event", e))?;

        Ok(())
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SecurityEvent>> {
        let rows = sqlx::query_as::<_, SecurityEventRow>(
            r#"
            SELECT id, user_id, session_id, event_type, ip_address, user_agent,
                   risk_level, detail, created_at
            FROM security_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find security events", e))?;

        rows.into_iter().map(SecurityEvent::try_from).collect()
    }
}
