//! PostgreSQL 吊销仓储

use aegis_common::{TokenId, UserId};
use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::db_error;
use crate::domain::entities::{RevocationReason, RevokedToken};
use crate::domain::repositories::RevocationRepository;

#[derive(Debug, sqlx::FromRow)]
struct RevokedTokenRow {
    token_id: Uuid,
    user_id: Uuid,
    reason: String,
    expires_at: DateTime<Utc>,
    revoked_at: DateTime<Utc>,
}

impl TryFrom<RevokedTokenRow> for RevokedToken {
    type Error = aegis_errors::AppError;

    fn try_from(row: RevokedTokenRow) -> Result<Self, Self::Error> {
        Ok(RevokedToken {
            token_id: TokenId::from(row.token_id),
            user_id: UserId::from(row.user_id),
            reason: row.reason.parse::<RevocationReason>()?,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
        })
    }
}

pub struct PostgresRevocationRepository {
    pool: PgPool,
}

impl PostgresRevocationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationRepository for PostgresRevocationRepository {
    async fn insert(&self, token: &RevokedToken) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (token_id, user_id, reason, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token_id) DO NOTHING
            "#,
        )
        .bind(token.token_id.0)
        .bind(token.user_id.0)
        .bind(token.reason.as_str())
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("revoke token", e))?;

        Ok(())
    }

    async fn is_revoked(&self, token_id: &TokenId) -> AppResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE token_id = $1)")
            .bind(token_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("check revocation", e))
    }

    async fn find(&self, token_id: &TokenId) -> AppResult<Option<RevokedToken>> {
        let row = sqlx::query_as::<_, RevokedTokenRow>(
            r#"
            SELECT token_id, user_id, reason, expires_at, revoked_at
            FROM revoked_tokens
            WHERE token_id = $1
            "#,
        )
        .bind(token_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find revoked token", e))?;

        row.map(RevokedToken::try_from).transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("prune revoked tokens", e))?;

        Ok(result.rows_affected())
    }
}
