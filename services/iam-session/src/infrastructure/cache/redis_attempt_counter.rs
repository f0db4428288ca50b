//! Redis 尝试计数
//!
//! 计数保存在 hash 中（`count` / `window_start` / `expires_at`，毫秒时间戳），
//! 整个窗口推进在一个 Lua 脚本里完成，键随窗口一起过期。

use aegis_adapter_redis::RedisScriptClient;
use aegis_errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::Script;

use crate::domain::entities::{AttemptCounter, AttemptKey, Reservation};
use crate::domain::repositories::AttemptCounterRepository;
use crate::domain::services::WindowPolicy;

/// 与 `reserve_window` 相同的语义，返回 `{granted, count, window_start, expires_at}`
const RESERVE_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local lock = tonumber(ARGV[4])

local count = tonumber(redis.call('HGET', key, 'count') or '0')
local window_start = tonumber(redis.call('HGET', key, 'window_start') or '0')
local expires_at = tonumber(redis.call('HGET', key, 'expires_at') or '0')

if count == 0 or now >= expires_at then
    count = 0
    window_start = now
    expires_at = now + window
elseif count >= limit then
    return {0, count, window_start, expires_at}
end

count = count + 1
if count >= limit and expires_at < now + lock then
    expires_at = now + lock
end

redis.call('HSET', key, 'count', count, 'window_start', window_start, 'expires_at', expires_at)
redis.call('PEXPIRE', key, expires_at - now)
return {1, count, window_start, expires_at}
"#;

/// 与 `release_window` 相同的语义
const RELEASE_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])

local count = tonumber(redis.call('HGET', key, 'count') or '0')
local expires_at = tonumber(redis.call('HGET', key, 'expires_at') or '0')

if count <= 1 or now >= expires_at then
    redis.call('DEL', key)
    return {0}
end

redis.call('HSET', key, 'count', count - 1)
return {count - 1}
"#;

const FIELDS: [&str; 3] = ["count", "window_start", "expires_at"];

pub struct RedisAttemptCounterRepository {
    client: RedisScriptClient,
    reserve: Script,
    release: Script,
}

impl RedisAttemptCounterRepository {
    pub fn new(client: RedisScriptClient) -> Self {
        Self {
            client,
            reserve: Script::new(RESERVE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }

    fn to_counter(values: &[i64]) -> AppResult<AttemptCounter> {
        let [count, window_start, expires_at] = values else {
            return Err(AppError::external_service(format!(
                "Unexpected attempt counter shape: {:?}",
                values
            )));
        };
        Ok(AttemptCounter {
            count: u32::try_from(*count).unwrap_or(0),
            window_start: from_millis(*window_start)?,
            expires_at: from_millis(*expires_at)?,
        })
    }

    fn to_reservation(values: &[i64]) -> AppResult<Reservation> {
        let Some((granted, counter)) = values.split_first() else {
            return Err(AppError::external_service("Empty attempt reservation reply"));
        };
        let counter = Self::to_counter(counter)?;
        Ok(if *granted == 1 {
            Reservation::Granted(counter)
        } else {
            Reservation::Denied(counter)
        })
    }
}

fn from_millis(ms: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| {
            AppError::external_service(format!("Invalid timestamp in attempt counter: {}", ms))
        })
}

#[async_trait]
impl AttemptCounterRepository for RedisAttemptCounterRepository {
    async fn reserve(
        &self,
        key: &AttemptKey,
        policy: &WindowPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let redis_key = self.client.key(&key.storage_key());
        let values = self
            .client
            .eval_i64s(
                &self.reserve,
                &[redis_key],
                &[
                    now.timestamp_millis(),
                    policy.window.num_milliseconds(),
                    i64::from(policy.max_attempts),
                    policy.lock_duration.num_milliseconds(),
                ],
            )
            .await?;

        Self::to_reservation(&values)
    }

    async fn release(&self, key: &AttemptKey, now: DateTime<Utc>) -> AppResult<()> {
        let redis_key = self.client.key(&key.storage_key());
        self.client
            .eval_i64s(&self.release, &[redis_key], &[now.timestamp_millis()])
            .await?;
        Ok(())
    }

    async fn reset(&self, key: &AttemptKey) -> AppResult<()> {
        self.client.delete(&self.client.key(&key.storage_key())).await
    }

    async fn find(
        &self,
        key: &AttemptKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AttemptCounter>> {
        let redis_key = self.client.key(&key.storage_key());
        let Some(values) = self.client.hget_i64s(&redis_key, &FIELDS).await? else {
            return Ok(None);
        };

        let counter = Self::to_counter(&values)?;
        Ok((now < counter.expires_at).then_some(counter))
    }

    /// 键由 PEXPIRE 自动过期
    async fn prune_expired(&self, _now: DateTime<Utc>) -> AppResult<u64> {
        Ok(0)
    }
}
