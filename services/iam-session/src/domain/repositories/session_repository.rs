//! 会话 Repository trait

use aegis_common::{SessionId, TokenId, UserId};
use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{Session, SessionEndReason};

/// 条件更新的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// 已更新，返回更新后的会话
    Applied(Session),
    /// 会话已结束
    Inactive(Session),
    /// 呈递的刷新令牌不是当前令牌
    TokenMismatch(Session),
    NotFound,
}

/// 一次刷新轮换
///
/// 仅当会话仍活跃且当前令牌等于 `expected_token_id` 时生效。
#[derive(Debug, Clone)]
pub struct SessionRotation {
    pub session_id: SessionId,
    pub expected_token_id: TokenId,
    pub new_token_id: TokenId,
    pub new_access_token_id: TokenId,
    pub access_expires_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// 插入新会话，并原子地把该用户的活跃会话数限制在 `max_active` 以内
    ///
    /// 超出的会话按最久未活动（相同则最早创建）淘汰，标记为 `Evicted`，返回被淘汰的会话。
    async fn insert_bounded(
        &self,
        session: &Session,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>>;

    async fn find_by_id(&self, id: &SessionId) -> AppResult<Option<Session>>;

    /// 用户当前活跃且未过期的会话
    async fn find_active_by_user_id(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>>;

    /// 更新最后活动时间与最近的请求来源
    async fn touch(
        &self,
        id: &SessionId,
        ip_address: &str,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<SessionUpdate>;

    /// 刷新令牌轮换（比较并交换）
    async fn rotate(&self, rotation: &SessionRotation) -> AppResult<SessionUpdate>;

    async fn deactivate(
        &self,
        id: &SessionId,
        reason: SessionEndReason,
        at: DateTime<Utc>,
    ) -> AppResult<SessionUpdate>;

    /// 结束用户的所有活跃会话，返回本次被结束的会话
    async fn deactivate_all_by_user_id(
        &self,
        user_id: &UserId,
        reason: SessionEndReason,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Session>>;

    /// 把已过期但仍标记为活跃的会话标记为 `Expired`
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// 删除在 `ended_before` 之前结束的会话
    async fn purge_inactive(&self, ended_before: DateTime<Utc>) -> AppResult<u64>;
}
