//! 服务组装
//!
//! 按配置选择存储后端，构造一次领域服务，再交给 `AuthCoordinator`。

use std::sync::Arc;
use std::time::Duration;

use aegis_adapter_postgres::{PostgresConfig, check_connection, create_pool};
use aegis_adapter_redis::RedisScriptClient;
use aegis_auth_core::{KeyMaterial, TokenIssuer};
use aegis_common::Clock;
use aegis_config::{AppConfig, LockoutBackend, StorageBackend};
use aegis_errors::{AppError, AppResult};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use tracing::info;

use crate::application::AuthServices;
use crate::domain::repositories::{
    AttemptCounterRepository, RevocationRepository, SecurityEventRepository, SessionRepository,
};
use crate::domain::services::{
    LockoutGuard, RevocationRegistry, SecurityEventLog, SessionStore, StoreDeadline,
    SuspiciousActivityDetector, WindowPolicy,
};
use crate::infrastructure::cache::RedisAttemptCounterRepository;
use crate::infrastructure::cleanup::CleanupTask;
use crate::infrastructure::persistence::memory::{
    InMemoryAttemptCounterRepository, InMemoryRevocationRepository, InMemorySecurityEventRepository,
    InMemorySessionRepository,
};
use crate::infrastructure::persistence::postgres::{
    PostgresAttemptCounterRepository, PostgresRevocationRepository, PostgresSecurityEventRepository,
    PostgresSessionRepository,
};

fn secs(value: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX))
}

/// 领域服务使用的四类仓储
#[derive(Clone)]
pub struct AuthRepositories {
    pub sessions: Arc<dyn SessionRepository>,
    pub revocations: Arc<dyn RevocationRepository>,
    pub attempts: Arc<dyn AttemptCounterRepository>,
    pub events: Arc<dyn SecurityEventRepository>,
}

impl AuthRepositories {
    /// 全部使用内存实现
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(InMemorySessionRepository::new()),
            revocations: Arc::new(InMemoryRevocationRepository::new()),
            attempts: Arc::new(InMemoryAttemptCounterRepository::new()),
            events: Arc::new(InMemorySecurityEventRepository::new()),
        }
    }

    /// 按配置连接存储
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        let mut repos = Self::in_memory();

        let pool = match config.storage.backend {
            StorageBackend::Postgres => Some(Self::connect_postgres(config).await?),
            StorageBackend::Memory => None,
        };

        if let Some(pool) = &pool {
            repos.sessions = Arc::new(PostgresSessionRepository::new(pool.clone()));
            repos.revocations = Arc::new(PostgresRevocationRepository::new(pool.clone()));
            repos.events = Arc::new(PostgresSecurityEventRepository::new(pool.clone()));
            info!("Using PostgreSQL session storage");
        } else {
            info!("Using in-memory session storage");
        }

        match config.lockout_store.backend {
            LockoutBackend::Memory => info!("Using in-memory attempt counters"),
            LockoutBackend::Postgres => {
                let pool = match &pool {
                    Some(pool) => pool.clone(),
                    None => Self::connect_postgres(config).await?,
                };
                repos.attempts = Arc::new(PostgresAttemptCounterRepository::new(pool));
                info!("Using PostgreSQL attempt counters");
            }
            LockoutBackend::Redis => {
                let redis = config.lockout_store.redis.as_ref().ok_or_else(|| {
                    AppError::validation("lockout_store.redis is required for the redis backend")
                })?;
                let conn = aegis_adapter_redis::connect(redis.url.expose_secret()).await?;
                let client = RedisScriptClient::new(conn).with_key_prefix(config.app_name.clone());
                repos.attempts = Arc::new(RedisAttemptCounterRepository::new(client));
                info!("Using Redis attempt counters");
            }
        }

        Ok(repos)
    }

    async fn connect_postgres(config: &AppConfig) -> AppResult<PgPool> {
        let database = config
            .storage
            .database
            .as_ref()
            .ok_or_else(|| {
                AppError::validation("storage.database is required for postgres storage")
            })?;
        let pg_config = PostgresConfig::new(database.url.expose_secret())
            .with_max_connections(database.max_connections)
            .with_statement_timeout(Duration::from_millis(config.storage.timeout_ms));
        let pool = create_pool(&pg_config).await?;
        check_connection(&pool).await?;
        Ok(pool)
    }
}

impl AuthServices {
    /// 按配置构造领域服务
    pub fn assemble(
        config: &AppConfig,
        keys: Arc<KeyMaterial>,
        repos: &AuthRepositories,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let deadline = StoreDeadline::from_millis(config.storage.timeout_ms);
        let session = &config.session;
        let lockout = &config.lockout;

        let tokens = TokenIssuer::new(
            keys,
            secs(session.access_ttl_secs),
            secs(session.refresh_ttl_secs),
            config.keys.issuer.clone(),
            config.keys.audience.clone(),
            clock.clone(),
        );
        let revocations =
            RevocationRegistry::new(repos.revocations.clone(), clock.clone(), deadline);
        let sessions = SessionStore::new(
            repos.sessions.clone(),
            revocations.clone(),
            session.max_sessions_per_user,
            secs(session.purge_after_secs),
            clock.clone(),
            deadline,
        );
        let login_policy = WindowPolicy::new(
            lockout.max_failed_attempts,
            secs(lockout.window_secs),
            secs(lockout.lockout_duration_secs),
        );
        let two_factor_policy = WindowPolicy::new(
            lockout.max_two_factor_attempts,
            secs(lockout.window_secs),
            secs(lockout.lockout_duration_secs),
        );
        let lockout = LockoutGuard::new(
            repos.attempts.clone(),
            login_policy,
            two_factor_policy,
            clock.clone(),
            deadline,
        );

        Self {
            tokens,
            sessions,
            revocations,
            lockout,
            detector: SuspiciousActivityDetector::new(secs(session.inactivity_threshold_secs)),
            events: SecurityEventLog::new(repos.events.clone(), deadline),
            clock,
            deadline,
        }
    }

    /// 基于这些服务的定期清理任务
    pub fn cleanup_task(&self, interval: Duration) -> CleanupTask {
        CleanupTask::new(
            self.sessions.clone(),
            self.revocations.clone(),
            self.lockout.clone(),
            self.clock.clone(),
            interval,
        )
    }
}
