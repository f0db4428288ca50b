//! 内存尝试计数仓储

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::entities::{AttemptCounter, AttemptKey, Reservation};
use crate::domain::repositories::AttemptCounterRepository;
use crate::domain::services::{WindowPolicy, release_window, reserve_window};

const SHARDS: usize = 16;

/// 分段锁：同一个键总落在同一段，读改写在段锁内完成
#[derive(Debug)]
pub struct InMemoryAttemptCounterRepository {
    shards: Vec<Mutex<HashMap<AttemptKey, AttemptCounter>>>,
}

impl InMemoryAttemptCounterRepository {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &AttemptKey) -> &Mutex<HashMap<AttemptKey, AttemptCounter>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARDS]
    }
}

impl Default for InMemoryAttemptCounterRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttemptCounterRepository for InMemoryAttemptCounterRepository {
    async fn reserve(
        &self,
        key: &AttemptKey,
        policy: &WindowPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let mut shard = self.shard(key).lock();
        let reservation = reserve_window(shard.get(key).copied(), policy, now);
        if let Reservation::Granted(counter) = reservation {
            shard.insert(key.clone(), counter);
        }
        Ok(reservation)
    }

    async fn release(&self, key: &AttemptKey, now: DateTime<Utc>) -> AppResult<()> {
        let mut shard = self.shard(key).lock();
        match release_window(shard.get(key).copied(), now) {
            Some(counter) => {
                shard.insert(key.clone(), counter);
            }
            None => {
                shard.remove(key);
            }
        }
        Ok(())
    }

    async fn reset(&self, key: &AttemptKey) -> AppResult<()> {
        self.shard(key).lock().remove(key);
        Ok(())
    }

    async fn find(
        &self,
        key: &AttemptKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AttemptCounter>> {
        Ok(self
            .shard(key)
            .lock()
            .get(key)
            .copied()
            .filter(|c| now < c.expires_at))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut pruned = 0;
        for shard in &self.shards {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|_, c| now < c.expires_at);
            pruned += (before - shard.len()) as u64;
        }
        Ok(pruned)
    }
}
