//! PostgreSQL 会话仓储

use aegis_common::{SessionId, TokenId, UserId};
use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::db_error;
use crate::domain::entities::{Session, SessionEndReason};
use crate::domain::repositories::{SessionRepository, SessionRotation, SessionUpdate};

const COLUMNS: &str = "id, user_id, token_id, access_token_id, device_fingerprint, ip_address, \
     user_agent, created_at, last_activity, expires_at, access_expires_at, active, end_reason, \
     ended_at";

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    token_id: Uuid,
    access_token_id: Uuid,
    device_fingerprint: String,
    ip_address: String,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access_expires_at: DateTime<Utc>,
    active: bool,
    end_reason: Option<String>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for Session {
    type Error = aegis_errors::AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let end_reason = row
            .end_reason
            .as_deref()
            .map(str::parse::<SessionEndReason>)
            .transpose()?;

        Ok(Session {
            id: SessionId::from(row.id),
            user_id: UserId::from(row.user_id),
            token_id: TokenId::from(row.token_id),
            access_token_id: TokenId::from(row.access_token_id),
            device_fingerprint: row.device_fingerprint,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            last_activity: row.last_activity,
            expires_at: row.expires_at,
            access_expires_at: row.access_expires_at,
            active: row.active,
            end_reason,
            ended_at: row.ended_at,
        })
    }
}

fn into_sessions(rows: Vec<SessionRow>) -> AppResult<Vec<Session>> {
    rows.into_iter().map(Session::try_from).collect()
}

pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 条件更新未命中时，按当前行判断原因
    async fn classify_miss(&self, id: &SessionId, at: DateTime<Utc>) -> AppResult<SessionUpdate> {
        Ok(match self.find_by_id(id).await? {
            None => SessionUpdate::NotFound,
            Some(session) if !session.active || session.expires_at <= at => {
                SessionUpdate::Inactive(session)
            }
            Some(session) => SessionUpdate::TokenMismatch(session),
        })
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn insert_bounded(
        &self,
        session: &Session,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        debug!(user_id = %session.user_id, session_id = %session.id, "Inserting session");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        // 同一用户的会话创建串行化
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(session.user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("lock user sessions", e))?;

        let active_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM auth_sessions
            WHERE user_id = $1 AND active AND expires_at > $2
            ORDER BY last_activity ASC, created_at ASC
            "#,
        )
        .bind(session.user_id.0)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| db_error("count active sessions", e))?;

        let overflow = (active_ids.len() + 1).saturating_sub(max_active.max(1));
        let evict: Vec<Uuid> = active_ids.into_iter().take(overflow).collect();

        let evicted = if evict.is_empty() {
            Vec::new()
        } else {
            let rows = sqlx::query_as::<_, SessionRow>(&format!(
                r#"
                UPDATE auth_sessions
                SET active = FALSE, end_reason = $2, ended_at = $3
                WHERE id = ANY($1)
                RETURNING {COLUMNS}
                "#
            ))
            .bind(&evict)
            .bind(SessionEndReason::Evicted.as_str())
            .bind(now)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| db_error("evict sessions", e))?;
            into_sessions(rows)?
        };

        sqlx::query(
            r#"
            INSERT INTO auth_sessions (id, user_id, token_id, access_token_id, device_fingerprint,
                                       ip_address, user_agent, created_at, last_activity,
                                       expires_at, access_expires_at, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, TRUE)
            "#,
        )
        .bind(session.id.0)
        .bind(session.user_id.0)
        .bind(session.token_id.0)
        .bind(session.access_token_id.0)
        .bind(&session.device_fingerprint)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.created_at)
        .bind(session.last_activity)
        .bind(session.expires_at)
        .bind(session.access_expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert session", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit session insert", e))?;

        Ok(evicted)
    }

    async fn find_by_id(&self, id: &SessionId) -> AppResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {COLUMNS} FROM auth_sessions WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find session", e))?;

        row.map(Session::try_from).transpose()
    }

    async fn find_active_by_user_id(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM auth_sessions
            WHERE user_id = $1 AND active AND expires_at > $2
            ORDER BY last_activity DESC
            "#
        ))
        .bind(user_id.0)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find active sessions", e))?;

        into_sessions(rows)
    }

    async fn touch(
        &self,
        id: &SessionId,
        ip_address: &str,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<SessionUpdate> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE auth_sessions
            SET last_activity = $2, ip_address = $3, user_agent = COALESCE($4, user_agent)
            WHERE id = $1 AND active AND expires_at > $2
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(at)
        .bind(ip_address)
        .bind(user_agent)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("touch session", e))?;

        match row {
            Some(row) => Ok(SessionUpdate::Applied(row.try_into()?)),
            None => self.classify_miss(id, at).await,
        }
    }

    async fn rotate(&self, rotation: &SessionRotation) -> AppResult<SessionUpdate> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE auth_sessions
            SET token_id = $3, access_token_id = $4, access_expires_at = $5,
                expires_at = $6, last_activity = $7
            WHERE id = $1 AND token_id = $2 AND active AND expires_at > $7
            RETURNING {COLUMNS}
            "#
        ))
        .bind(rotation.session_id.0)
        .bind(rotation.expected_token_id.0)
        .bind(rotation.new_token_id.0)
        .bind(rotation.new_access_token_id.0)
        .bind(rotation.access_expires_at)
        .bind(rotation.expires_at)
        .bind(rotation.at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("rotate session", e))?;

        match row {
            Some(row) => Ok(SessionUpdate::Applied(row.try_into()?)),
            None => self.classify_miss(&rotation.session_id, rotation.at).await,
        }
    }

    async fn deactivate(
        &self,
        id: &SessionId,
        reason: SessionEndReason,
        at: DateTime<Utc>,
    ) -> AppResult<SessionUpdate> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE auth_sessions
            SET active = FALSE, end_reason = $2, ended_at = $3
            WHERE id = $1 AND active
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(reason.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("deactivate session", e))?;

        match row {
            Some(row) => Ok(SessionUpdate::Applied(row.try_into()?)),
            None => Ok(match self.find_by_id(id).await? {
                Some(session) => SessionUpdate::Inactive(session),
                None => SessionUpdate::NotFound,
            }),
        }
    }

    async fn deactivate_all_by_user_id(
        &self,
        user_id: &UserId,
        reason: SessionEndReason,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE auth_sessions
            SET active = FALSE, end_reason = $2, ended_at = $3
            WHERE user_id = $1 AND active
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id.0)
        .bind(reason.as_str())
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("deactivate user sessions", e))?;

        into_sessions(rows)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET active = FALSE, end_reason = $2, ended_at = $1
            WHERE active AND expires_at <= $1
            "#,
        )
        .bind(now)
        .bind(SessionEndReason::Expired.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("expire sessions", e))?;

        Ok(result.rows_affected())
    }

    async fn purge_inactive(&self, ended_before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE NOT active AND ended_at < $1")
            .bind(ended_before)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("purge sessions", e))?;

        Ok(result.rows_affected())
    }
}
