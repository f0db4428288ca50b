//! 内存会话仓储

use std::collections::HashMap;

use aegis_common::{SessionId, UserId};
use aegis_errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::entities::{Session, SessionEndReason};
use crate::domain::repositories::{SessionRepository, SessionRotation, SessionUpdate};

/// 所有写操作都在同一把写锁内完成，保证每个用户的会话上限与轮换比较都是线性一致的。
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn end(session: &mut Session, reason: SessionEndReason, at: DateTime<Utc>) {
        session.active = false;
        session.end_reason = Some(reason);
        session.ended_at = Some(at);
    }

    fn is_usable(session: &Session, now: DateTime<Utc>) -> bool {
        session.active && now < session.expires_at
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert_bounded(
        &self,
        session: &Session,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.id) {
            return Err(AppError::conflict(format!("Session {} already exists", session.id)));
        }

        let mut active: Vec<(DateTime<Utc>, DateTime<Utc>, SessionId)> = sessions
            .values()
            .filter(|s| s.user_id == session.user_id && Self::is_usable(s, now))
            .map(|s| (s.last_activity, s.created_at, s.id))
            .collect();
        active.sort_by_key(|(last_activity, created_at, _)| (*last_activity, *created_at));

        let overflow = (active.len() + 1).saturating_sub(max_active.max(1));
        let mut evicted = Vec::with_capacity(overflow);
        for (_, _, id) in active.into_iter().take(overflow) {
            if let Some(old) = sessions.get_mut(&id) {
                Self::end(old, SessionEndReason::Evicted, now);
                evicted.push(old.clone());
            }
        }

        sessions.insert(session.id, session.clone());
        Ok(evicted)
    }

    async fn find_by_id(&self, id: &SessionId) -> AppResult<Option<Session>> {
        Ok(self.sessions.read().get(id).cloned())
    }

    async fn find_active_by_user_id(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let mut active: Vec<Session> = self
            .sessions
            .read()
            .values()
            .filter(|s| &s.user_id == user_id && Self::is_usable(s, now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(active)
    }

    async fn touch(
        &self,
        id: &SessionId,
        ip_address: &str,
        user_agent: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<SessionUpdate> {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(id) else {
            return Ok(SessionUpdate::NotFound);
        };
        if !Self::is_usable(session, at) {
            return Ok(SessionUpdate::Inactive(session.clone()));
        }

        session.last_activity = at;
        session.ip_address = ip_address.to_string();
        if let Some(user_agent) = user_agent {
            session.user_agent = Some(user_agent.to_string());
        }
        Ok(SessionUpdate::Applied(session.clone()))
    }

    async fn rotate(&self, rotation: &SessionRotation) -> AppResult<SessionUpdate> {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(&rotation.session_id) else {
            return Ok(SessionUpdate::NotFound);
        };
        if !Self::is_usable(session, rotation.at) {
            return Ok(SessionUpdate::Inactive(session.clone()));
        }
        if session.token_id != rotation.expected_token_id {
            return Ok(SessionUpdate::TokenMismatch(session.clone()));
        }

        session.token_id = rotation.new_token_id;
        session.access_token_id = rotation.new_access_token_id;
        session.access_expires_at = rotation.access_expires_at;
        session.expires_at = rotation.expires_at;
        session.last_activity = rotation.at;
        Ok(SessionUpdate::Applied(session.clone()))
    }

    async fn deactivate(
        &self,
        id: &SessionId,
        reason: SessionEndReason,
        at: DateTime<Utc>,
    ) -> AppResult<SessionUpdate> {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(id) else {
            return Ok(SessionUpdate::NotFound);
        };
        if !session.active {
            return Ok(SessionUpdate::Inactive(session.clone()));
        }

        Self::end(session, reason, at);
        Ok(SessionUpdate::Applied(session.clone()))
    }

    async fn deactivate_all_by_user_id(
        &self,
        user_id: &UserId,
        reason: SessionEndReason,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<Session>> {
        let mut sessions = self.sessions.write();
        let mut ended = Vec::new();
        for session in sessions.values_mut() {
            if &session.user_id == user_id && session.active {
                Self::end(session, reason, at);
                ended.push(session.clone());
            }
        }
        Ok(ended)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = self.sessions.write();
        let mut count = 0;
        for session in sessions.values_mut() {
            if session.active && session.expires_at <= now {
                Self::end(session, SessionEndReason::Expired, now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_inactive(&self, ended_before: DateTime<Utc>) -> AppResult<u64> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.active || s.ended_at.is_none_or(|ended| ended >= ended_before));
        Ok((before - sessions.len()) as u64)
    }
}
