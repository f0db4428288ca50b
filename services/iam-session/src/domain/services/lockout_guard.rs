//! 失败尝试计数与临时锁定

use std::sync::Arc;

use aegis_common::Clock;
use aegis_errors::AppResult;
use chrono::{DateTime, Duration, Utc};

use super::StoreDeadline;
use crate::domain::entities::{AttemptCounter, AttemptKey, AttemptScope, Reservation};
use crate::domain::repositories::AttemptCounterRepository;

/// 一个作用域的窗口策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub lock_duration: Duration,
}

impl WindowPolicy {
    pub fn new(max_attempts: u32, window: Duration, lock_duration: Duration) -> Self {
        Self {
            max_attempts,
            window,
            lock_duration,
        }
    }

    pub fn is_locked(&self, counter: &AttemptCounter) -> bool {
        counter.count >= self.max_attempts
    }
}

/// 在已有计数上记录一次失败
///
/// 没有未过期的窗口时从 `now` 开启新窗口；计数达到上限时，窗口至少延长到 `now + lock_duration`。
/// 各存储实现必须在同一把锁 / 同一个原子操作内完成读与写。
pub fn advance_window(
    previous: Option<AttemptCounter>,
    policy: &WindowPolicy,
    now: DateTime<Utc>,
) -> AttemptCounter {
    let mut counter = match previous {
        Some(counter) if counter.count > 0 && now < counter.expires_at => counter,
        _ => AttemptCounter {
            count: 0,
            window_start: now,
            expires_at: now + policy.window,
        },
    };

    counter.count = counter.count.saturating_add(1);
    if policy.is_locked(&counter) {
        let lock_until = now + policy.lock_duration;
        if counter.expires_at < lock_until {
            counter.expires_at = lock_until;
        }
    }
    counter
}

/// 在同一个原子操作内判断上限并计入本次尝试
///
/// 未过期窗口的计数已达上限时拒绝且不改动计数；否则按 `advance_window` 递增。
pub fn reserve_window(
    previous: Option<AttemptCounter>,
    policy: &WindowPolicy,
    now: DateTime<Utc>,
) -> Reservation {
    match previous {
        Some(counter) if now < counter.expires_at && policy.is_locked(&counter) => {
            Reservation::Denied(counter)
        }
        _ => Reservation::Granted(advance_window(previous, policy, now)),
    }
}

/// 退还一次预占
///
/// 返回 `None` 表示键应被删除（窗口已过期或计数归零）。
pub fn release_window(
    previous: Option<AttemptCounter>,
    now: DateTime<Utc>,
) -> Option<AttemptCounter> {
    let mut counter = previous.filter(|c| now < c.expires_at)?;
    counter.count = counter.count.saturating_sub(1);
    (counter.count > 0).then_some(counter)
}

/// 已预占、尚未定论的一次尝试
///
/// 预占即计数；结果出来后交给 `fail` / `succeed` / `release` 之一。
#[must_use]
#[derive(Debug)]
pub struct AttemptPermit {
    key: AttemptKey,
    counter: AttemptCounter,
}

impl AttemptPermit {
    pub fn key(&self) -> &AttemptKey {
        &self.key
    }

    /// 计入本次后的窗口计数
    pub fn count(&self) -> u32 {
        self.counter.count
    }
}

/// 锁定守卫
#[derive(Clone)]
pub struct LockoutGuard {
    repo: Arc<dyn AttemptCounterRepository>,
    login_policy: WindowPolicy,
    two_factor_policy: WindowPolicy,
    clock: Arc<dyn Clock>,
    deadline: StoreDeadline,
}

impl LockoutGuard {
    pub fn new(
        repo: Arc<dyn AttemptCounterRepository>,
        login_policy: WindowPolicy,
        two_factor_policy: WindowPolicy,
        clock: Arc<dyn Clock>,
        deadline: StoreDeadline,
    ) -> Self {
        Self {
            repo,
            login_policy,
            two_factor_policy,
            clock,
            deadline,
        }
    }

    pub fn policy(&self, scope: AttemptScope) -> &WindowPolicy {
        match scope {
            AttemptScope::Login => &self.login_policy,
            AttemptScope::TwoFactor => &self.two_factor_policy,
        }
    }

    /// 预占一次尝试，键已锁定时返回 `None`
    pub async fn reserve(&self, key: &AttemptKey) -> AppResult<Option<AttemptPermit>> {
        let policy = self.policy(key.scope);
        let now = self.clock.now();
        let reservation = self
            .deadline
            .run("attempts.reserve", self.repo.reserve(key, policy, now))
            .await?;

        match reservation {
            Reservation::Granted(counter) => Ok(Some(AttemptPermit {
                key: key.clone(),
                counter,
            })),
            Reservation::Denied(counter) => {
                tracing::warn!(
                    key = %key,
                    attempt_count = counter.count,
                    locked_until = %counter.expires_at,
                    "Attempt rejected by lockout"
                );
                Ok(None)
            }
        }
    }

    /// 依次预占多个键；任一被锁定或出错时退还已拿到的预占
    pub async fn reserve_all(&self, keys: &[AttemptKey]) -> AppResult<Option<Vec<AttemptPermit>>> {
        let mut permits = Vec::with_capacity(keys.len());
        for key in keys {
            match self.reserve(key).await {
                Ok(Some(permit)) => permits.push(permit),
                Ok(None) => {
                    self.release_all(permits).await;
                    return Ok(None);
                }
                Err(e) => {
                    self.release_all(permits).await;
                    return Err(e);
                }
            }
        }
        Ok(Some(permits))
    }

    /// 本次尝试失败：预占保留为失败计数，返回窗口内的失败次数
    pub fn fail(&self, permit: AttemptPermit) -> u32 {
        let AttemptPermit { key, counter } = permit;
        let policy = self.policy(key.scope);

        tracing::warn!(
            key = %key,
            attempt_count = counter.count,
            max_attempts = policy.max_attempts,
            "Failed attempt recorded"
        );

        if counter.count == policy.max_attempts {
            metrics::counter!("auth_lockouts_total", "scope" => key.scope.as_str()).increment(1);
            tracing::warn!(
                key = %key,
                locked_until = %counter.expires_at,
                "Lockout triggered"
            );
        }

        counter.count
    }

    /// 本次尝试成功：清零该键
    pub async fn succeed(&self, permit: AttemptPermit) -> AppResult<()> {
        self.deadline
            .run("attempts.reset", self.repo.reset(&permit.key))
            .await
    }

    /// 本次尝试不计入（成功但不清零的键，或未能得出结论）
    pub async fn release(&self, permit: AttemptPermit) -> AppResult<()> {
        let now = self.clock.now();
        self.deadline
            .run("attempts.release", self.repo.release(&permit.key, now))
            .await
    }

    /// 出错路径上退还预占；退还失败只记录日志，计数偏保守
    pub async fn release_all(&self, permits: Vec<AttemptPermit>) {
        for permit in permits {
            let key = permit.key.clone();
            if let Err(e) = self.release(permit).await {
                tracing::warn!(key = %key, error = %e, "Failed to release attempt reservation");
            }
        }
    }

    /// 记录一次已有结论的尝试，返回当前窗口的失败次数
    ///
    /// 成功清零；失败原子递增。键已锁定时不再递增，直接返回当前计数。
    pub async fn record_attempt(&self, key: &AttemptKey, success: bool) -> AppResult<u32> {
        if success {
            self.deadline.run("attempts.reset", self.repo.reset(key)).await?;
            return Ok(0);
        }

        match self.reserve(key).await? {
            Some(permit) => Ok(self.fail(permit)),
            None => {
                let now = self.clock.now();
                let counter = self
                    .deadline
                    .run("attempts.find", self.repo.find(key, now))
                    .await?;
                Ok(counter.map(|c| c.count).unwrap_or(0))
            }
        }
    }

    pub async fn is_locked(&self, key: &AttemptKey) -> AppResult<bool> {
        Ok(self.lock_remaining(key).await?.is_some())
    }

    /// 剩余锁定时间；未锁定返回 `None`
    pub async fn lock_remaining(&self, key: &AttemptKey) -> AppResult<Option<Duration>> {
        let now = self.clock.now();
        let counter = self
            .deadline
            .run("attempts.find", self.repo.find(key, now))
            .await?;

        Ok(counter
            .filter(|c| self.policy(key.scope).is_locked(c))
            .map(|c| c.expires_at - now))
    }

    pub async fn prune(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.deadline
            .run("attempts.prune_expired", self.repo.prune_expired(now))
            .await
    }
}
