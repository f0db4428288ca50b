//! 吊销表

use std::sync::Arc;

use aegis_common::{Clock, TokenId, UserId};
use aegis_errors::AppResult;
use chrono::{DateTime, Utc};

use super::StoreDeadline;
use crate::domain::entities::{RevocationReason, RevokedToken, Session};
use crate::domain::repositories::RevocationRepository;

/// 已吊销令牌集合
///
/// 令牌一旦进入此集合便不再通过校验，直到自然过期后被 `prune` 删除。
#[derive(Clone)]
pub struct RevocationRegistry {
    repo: Arc<dyn RevocationRepository>,
    clock: Arc<dyn Clock>,
    deadline: StoreDeadline,
}

impl RevocationRegistry {
    pub fn new(
        repo: Arc<dyn RevocationRepository>,
        clock: Arc<dyn Clock>,
        deadline: StoreDeadline,
    ) -> Self {
        Self { repo, clock, deadline }
    }

    pub async fn add(
        &self,
        token_id: TokenId,
        user_id: UserId,
        reason: RevocationReason,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let record = RevokedToken {
            token_id,
            user_id,
            reason,
            expires_at,
            revoked_at: self.clock.now(),
        };
        self.deadline
            .run("revocation.insert", self.repo.insert(&record))
            .await?;

        tracing::debug!(
            token_id = %token_id,
            user_id = %user_id,
            reason = %reason,
            "Token revoked"
        );
        Ok(())
    }

    pub async fn is_revoked(&self, token_id: &TokenId) -> AppResult<bool> {
        self.deadline
            .run("revocation.is_revoked", self.repo.is_revoked(token_id))
            .await
    }

    /// 吊销会话当前的刷新令牌和访问令牌
    pub async fn revoke_session_tokens(
        &self,
        session: &Session,
        reason: RevocationReason,
    ) -> AppResult<()> {
        self.add(session.token_id, session.user_id, reason, session.expires_at)
            .await?;
        self.add(
            session.access_token_id,
            session.user_id,
            reason,
            session.access_expires_at,
        )
        .await
    }

    /// 删除 `expires_at < now` 的记录
    pub async fn prune(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.deadline
            .run("revocation.delete_expired", self.repo.delete_expired(now))
            .await
    }
}
