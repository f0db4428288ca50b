//! 内存吊销仓储

use std::collections::HashMap;

use aegis_common::TokenId;
use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::entities::RevokedToken;
use crate::domain::repositories::RevocationRepository;

#[derive(Debug, Default)]
pub struct InMemoryRevocationRepository {
    tokens: RwLock<HashMap<TokenId, RevokedToken>>,
}

impl InMemoryRevocationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

#[async_trait]
impl RevocationRepository for InMemoryRevocationRepository {
    async fn insert(&self, token: &RevokedToken) -> AppResult<()> {
        self.tokens
            .write()
            .entry(token.token_id)
            .or_insert_with(|| token.clone());
        Ok(())
    }

    async fn is_revoked(&self, token_id: &TokenId) -> AppResult<bool> {
        Ok(self.tokens.read().contains_key(token_id))
    }

    async fn find(&self, token_id: &TokenId) -> AppResult<Option<RevokedToken>> {
        Ok(self.tokens.read().get(token_id).cloned())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tokens = self.tokens.write();
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at >= now);
        Ok((before - tokens.len()) as u64)
    }
}
