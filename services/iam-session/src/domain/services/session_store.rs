//! 会话存储服务

use std::sync::Arc;

use aegis_common::{Clock, SessionId, TokenId, UserId};
use aegis_auth_core::IssuedTokens;
use aegis_errors::AppResult;
use chrono::{DateTime, Duration, Utc};

use super::{RevocationRegistry, StoreDeadline};
use crate::domain::entities::{
    NewSession, RevocationReason, Session, SessionEndReason, SessionState,
};
use crate::domain::repositories::{SessionRepository, SessionRotation, SessionUpdate};
use crate::error::{AuthError, AuthServiceResult};

/// 新建会话的结果
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: Session,
    /// 为满足会话上限而被淘汰的会话
    pub evicted: Vec<Session>,
}

/// 一次清理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: u64,
    pub purged: u64,
}

/// 会话存储
///
/// 负责会话上限、轮换与停用；所有停用都会同时吊销会话当前的令牌。
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    revocations: RevocationRegistry,
    max_sessions: usize,
    purge_after: Duration,
    clock: Arc<dyn Clock>,
    deadline: StoreDeadline,
}

impl SessionStore {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        revocations: RevocationRegistry,
        max_sessions: usize,
        purge_after: Duration,
        clock: Arc<dyn Clock>,
        deadline: StoreDeadline,
    ) -> Self {
        Self {
            repo,
            revocations,
            max_sessions,
            purge_after,
            clock,
            deadline,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// 会话在 `now` 时刻的生命周期状态
    pub fn state_of(session: &Session, now: DateTime<Utc>) -> SessionState {
        if !session.active {
            match session.end_reason {
                Some(SessionEndReason::Expired) | None => SessionState::Expired,
                Some(reason) => SessionState::Revoked(reason),
            }
        } else if now >= session.expires_at {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    /// 创建会话；达到上限时淘汰最久未活动的会话
    pub async fn create(&self, new: NewSession) -> AuthServiceResult<CreatedSession> {
        let now = self.clock.now();
        let session = Session::open(new, now);

        let evicted = self
            .deadline
            .run(
                "session.insert_bounded",
                self.repo.insert_bounded(&session, self.max_sessions, now),
            )
            .await?;

        for old in &evicted {
            self.revocations
                .revoke_session_tokens(old, SessionEndReason::Evicted.revocation_reason())
                .await?;
            metrics::counter!("auth_sessions_evicted_total").increment(1);
            tracing::info!(
                user_id = %old.user_id,
                session_id = %old.id,
                last_activity = %old.last_activity,
                "Session evicted by per-user session limit"
            );
        }

        tracing::info!(
            user_id = %session.user_id,
            session_id = %session.id,
            evicted = evicted.len(),
            "Session created"
        );

        Ok(CreatedSession { session, evicted })
    }

    pub async fn find(&self, id: &SessionId) -> AuthServiceResult<Session> {
        self.deadline
            .run("session.find_by_id", self.repo.find_by_id(id))
            .await?
            .ok_or(AuthError::SessionNotFound)
    }

    /// 记录一次活动，不改变令牌
    pub async fn touch(
        &self,
        id: &SessionId,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> AuthServiceResult<Session> {
        let now = self.clock.now();
        let update = self
            .deadline
            .run(
                "session.touch",
                self.repo.touch(id, ip_address, user_agent, now),
            )
            .await?;

        match update {
            SessionUpdate::Applied(session) => Ok(session),
            SessionUpdate::Inactive(_) | SessionUpdate::TokenMismatch(_) => {
                Err(AuthError::TokenRevoked)
            }
            SessionUpdate::NotFound => Err(AuthError::SessionNotFound),
        }
    }

    /// 刷新轮换
    ///
    /// 仅当 `presented` 仍是会话当前的刷新令牌时生效；成功后旧的令牌对被吊销。
    /// 比较失败返回 `ReplayDetected`，由调用方处理整个会话。
    pub async fn rotate(
        &self,
        previous: &Session,
        presented: &TokenId,
        tokens: &IssuedTokens,
    ) -> AuthServiceResult<Session> {
        let rotation = SessionRotation {
            session_id: previous.id,
            expected_token_id: *presented,
            new_token_id: tokens.refresh_token_id,
            new_access_token_id: tokens.access_token_id,
            access_expires_at: tokens.access_expires_at,
            expires_at: tokens.refresh_expires_at,
            at: self.clock.now(),
        };

        let update = self
            .deadline
            .run("session.rotate", self.repo.rotate(&rotation))
            .await?;

        match update {
            SessionUpdate::Applied(session) => {
                self.revocations
                    .add(
                        *presented,
                        previous.user_id,
                        RevocationReason::Revoked,
                        previous.expires_at,
                    )
                    .await?;
                self.revocations
                    .add(
                        previous.access_token_id,
                        previous.user_id,
                        RevocationReason::Revoked,
                        previous.access_expires_at,
                    )
                    .await?;
                Ok(session)
            }
            SessionUpdate::TokenMismatch(_) => Err(AuthError::ReplayDetected),
            SessionUpdate::Inactive(_) => Err(AuthError::TokenRevoked),
            SessionUpdate::NotFound => Err(AuthError::SessionNotFound),
        }
    }

    /// 停用会话（幂等）
    ///
    /// 返回本次被停用的会话；会话早已结束时返回 `None`。
    pub async fn deactivate(
        &self,
        id: &SessionId,
        reason: SessionEndReason,
    ) -> AuthServiceResult<Option<Session>> {
        let now = self.clock.now();
        let update = self
            .deadline
            .run("session.deactivate", self.repo.deactivate(id, reason, now))
            .await?;

        match update {
            SessionUpdate::Applied(session) => {
                self.revocations
                    .revoke_session_tokens(&session, reason.revocation_reason())
                    .await?;
                tracing::info!(
                    user_id = %session.user_id,
                    session_id = %session.id,
                    reason = %reason,
                    "Session deactivated"
                );
                Ok(Some(session))
            }
            SessionUpdate::Inactive(_) | SessionUpdate::TokenMismatch(_) => Ok(None),
            SessionUpdate::NotFound => Err(AuthError::SessionNotFound),
        }
    }

    /// 停用用户的全部会话
    pub async fn deactivate_all_for_user(
        &self,
        user_id: &UserId,
        reason: SessionEndReason,
    ) -> AuthServiceResult<Vec<Session>> {
        let now = self.clock.now();
        let ended = self
            .deadline
            .run(
                "session.deactivate_all_by_user_id",
                self.repo.deactivate_all_by_user_id(user_id, reason, now),
            )
            .await?;

        for session in &ended {
            self.revocations
                .revoke_session_tokens(session, reason.revocation_reason())
                .await?;
        }

        tracing::info!(
            user_id = %user_id,
            reason = %reason,
            count = ended.len(),
            "All sessions deactivated for user"
        );

        Ok(ended)
    }

    pub async fn list_active(&self, user_id: &UserId) -> AuthServiceResult<Vec<Session>> {
        let now = self.clock.now();
        Ok(self
            .deadline
            .run(
                "session.find_active_by_user_id",
                self.repo.find_active_by_user_id(user_id, now),
            )
            .await?)
    }

    /// 标记过期会话，并删除结束超过保留期的会话
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let expired = self
            .deadline
            .run("session.deactivate_expired", self.repo.deactivate_expired(now))
            .await?;
        let purged = self
            .deadline
            .run(
                "session.purge_inactive",
                self.repo.purge_inactive(now - self.purge_after),
            )
            .await?;

        Ok(SweepReport { expired, purged })
    }
}
