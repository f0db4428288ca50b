//! 内存安全事件仓储

use aegis_common::UserId;
use aegis_errors::AppResult;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::entities::SecurityEvent;
use crate::domain::repositories::SecurityEventRepository;

#[derive(Debug, Default)]
pub struct InMemorySecurityEventRepository {
    events: RwLock<Vec<SecurityEvent>>,
}

impl InMemorySecurityEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部事件（追加顺序）
    pub fn all(&self) -> Vec<SecurityEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl SecurityEventRepository for InMemorySecurityEventRepository {
    async fn append(&self, event: &SecurityEvent) -> AppResult<()> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SecurityEvent>> {
        let mut events: Vec<SecurityEvent> = self
            .events
            .read()
            .iter()
            .filter(|e| e.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit);
        Ok(events)
    }
}
