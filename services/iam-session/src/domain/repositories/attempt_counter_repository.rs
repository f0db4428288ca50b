//! 尝试计数 Repository trait

use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{AttemptCounter, AttemptKey, Reservation};
use crate::domain::services::WindowPolicy;

#[async_trait]
pub trait AttemptCounterRepository: Send + Sync {
    /// 原子地判断并预占一次尝试
    ///
    /// 语义与 `reserve_window` 一致：读、判断上限、递增在同一个原子操作内完成。
    async fn reserve(
        &self,
        key: &AttemptKey,
        policy: &WindowPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation>;

    /// 退还一次预占，语义与 `release_window` 一致
    async fn release(&self, key: &AttemptKey, now: DateTime<Utc>) -> AppResult<()>;

    async fn reset(&self, key: &AttemptKey) -> AppResult<()>;

    /// 仅返回未过期的窗口
    async fn find(&self, key: &AttemptKey, now: DateTime<Utc>) -> AppResult<Option<AttemptCounter>>;

    /// 删除过期窗口，依赖 TTL 的实现返回 0
    async fn prune_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
