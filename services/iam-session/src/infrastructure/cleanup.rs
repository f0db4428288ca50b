//! 定期清理任务
//!
//! 标记过期会话、删除结束已久的会话、删除自然过期的吊销记录与尝试计数。
//! 不在请求路径上运行，所有操作幂等，可与在线流量并发。

use std::sync::Arc;
use std::time::Duration;

use aegis_common::Clock;
use aegis_errors::AppResult;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::services::{LockoutGuard, RevocationRegistry, SessionStore};

/// 一轮清理的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions_expired: u64,
    pub sessions_purged: u64,
    pub revocations_pruned: u64,
    pub attempts_pruned: u64,
}

pub struct CleanupTask {
    sessions: SessionStore,
    revocations: RevocationRegistry,
    lockout: LockoutGuard,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl CleanupTask {
    pub fn new(
        sessions: SessionStore,
        revocations: RevocationRegistry,
        lockout: LockoutGuard,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            sessions,
            revocations,
            lockout,
            clock,
            interval,
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Cleanup task started");
            let mut ticker = interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_cleanup().await {
                            error!(error = %e, "Failed to run periodic cleanup");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Cleanup task received shutdown signal");
                        break;
                    }
                }
            }
            info!("Cleanup task stopped");
        })
    }

    pub async fn run_cleanup(&self) -> AppResult<CleanupReport> {
        let now = self.clock.now();
        let sweep = self.sessions.sweep(now).await?;
        let revocations_pruned = self.revocations.prune(now).await?;
        let attempts_pruned = self.lockout.prune(now).await?;

        metrics::counter!("auth_cleanup_sessions_total").increment(sweep.expired + sweep.purged);
        metrics::counter!("auth_cleanup_revocations_total").increment(revocations_pruned);

        let report = CleanupReport {
            sessions_expired: sweep.expired,
            sessions_purged: sweep.purged,
            revocations_pruned,
            attempts_pruned,
        };
        if report != CleanupReport::default() {
            info!(
                sessions_expired = report.sessions_expired,
                sessions_purged = report.sessions_purged,
                revocations_pruned = report.revocations_pruned,
                attempts_pruned = report.attempts_pruned,
                "Periodic cleanup finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::NewSession;
    use crate::domain::entities::AttemptKey;
    use crate::domain::services::{StoreDeadline, WindowPolicy};
    use crate::infrastructure::persistence::memory::{
        InMemoryAttemptCounterRepository, InMemoryRevocationRepository, InMemorySessionRepository,
    };
    use aegis_common::{ManualClock, SessionId, TokenId, UserId};

    fn task(clock: Arc<ManualClock>) -> (CleanupTask, SessionStore, LockoutGuard) {
        let deadline = StoreDeadline::default();
        let revocations = RevocationRegistry::new(
            Arc::new(InMemoryRevocationRepository::new()),
            clock.clone(),
            deadline,
        );
        let sessions = SessionStore::new(
            Arc::new(InMemorySessionRepository::new()),
            revocations.clone(),
            5,
            chrono::Duration::days(1),
            clock.clone(),
            deadline,
        );
        let policy =
            WindowPolicy::new(5, chrono::Duration::minutes(1), chrono::Duration::minutes(5));
        let lockout = LockoutGuard::new(
            Arc::new(InMemoryAttemptCounterRepository::new()),
            policy,
            policy,
            clock.clone(),
            deadline,
        );
        let task = CleanupTask::new(
            sessions.clone(),
            revocations,
            lockout.clone(),
            clock,
            Duration::from_secs(60),
        );
        (task, sessions, lockout)
    }

    #[tokio::test]
    async fn test_run_cleanup_collects_expired_state() {
        let clock = Arc::new(ManualClock::starting_now());
        let (task, sessions, lockout) = task(clock.clone());
        let now = clock.now();

        let session = sessions
            .create(NewSession {
                id: SessionId::new(),
                user_id: UserId::new(),
                token_id: TokenId::new(),
                access_token_id: TokenId::new(),
                device_fingerprint: "fp".to_string(),
                ip_address: "10.0.0.1".to_string(),
                user_agent: None,
                expires_at: now + chrono::Duration::hours(2),
                access_expires_at: now + chrono::Duration::hours(1),
            })
            .await
            .unwrap()
            .session;
        sessions
            .deactivate(&session.id, crate::domain::entities::SessionEndReason::Logout)
            .await
            .unwrap();
        lockout
            .record_attempt(&AttemptKey::login_ip("10.0.0.1"), false)
            .await
            .unwrap();

        assert_eq!(task.run_cleanup().await.unwrap(), CleanupReport::default());

        clock.advance(chrono::Duration::days(2));
        let report = task.run_cleanup().await.unwrap();
        assert_eq!(report.sessions_purged, 1);
        assert_eq!(report.revocations_pruned, 2);
        assert_eq!(report.attempts_pruned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stops_on_cancellation() {
        let clock = Arc::new(ManualClock::starting_now());
        let (task, _, _) = task(clock);
        let shutdown = CancellationToken::new();

        let handle = Arc::new(task).start(shutdown.clone());
        tokio::time::sleep(Duration::from_secs(120)).await;
        shutdown.cancel();

        handle.await.unwrap();
    }
}
