//! 安全事件 Repository trait

use aegis_common::UserId;
use aegis_errors::AppResult;
use async_trait::async_trait;

use crate::domain::entities::SecurityEvent;

#[async_trait]
pub trait SecurityEventRepository: Send + Sync {
    async fn append(&self, event: &SecurityEvent) -> AppResult<()>;

    /// 按时间倒序
    async fn find_by_user_id(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SecurityEvent>>;
}
