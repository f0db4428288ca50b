//! 吊销 Repository trait

use aegis_common::TokenId;
use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::RevokedToken;

#[async_trait]
pub trait RevocationRepository: Send + Sync {
    /// 幂等：已存在则保留第一次的记录
    async fn insert(&self, token: &RevokedToken) -> AppResult<()>;

    async fn is_revoked(&self, token_id: &TokenId) -> AppResult<bool>;

    async fn find(&self, token_id: &TokenId) -> AppResult<Option<RevokedToken>>;

    /// 删除令牌已自然过期的记录
    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64>;
}
