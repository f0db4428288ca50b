//! PostgreSQL 尝试计数仓储

use aegis_errors::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::db_error;
use crate::domain::entities::{AttemptCounter, AttemptKey, Reservation};
use crate::domain::repositories::AttemptCounterRepository;
use crate::domain::services::{WindowPolicy, release_window, reserve_window};

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    count: i32,
    window_start: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<AttemptRow> for AttemptCounter {
    fn from(row: AttemptRow) -> Self {
        AttemptCounter {
            count: row.count.max(0) as u32,
            window_start: row.window_start,
            expires_at: row.expires_at,
        }
    }
}

pub struct PostgresAttemptCounterRepository {
    pool: PgPool,
}

impl PostgresAttemptCounterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PostgresAttemptCounterRepository {
    /// 开启事务并对该键加事务级咨询锁，返回锁内读到的计数
    async fn lock_key(
        &self,
        storage_key: &str,
    ) -> AppResult<(Transaction<'static, Postgres>, Option<AttemptCounter>)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        // 同一个键的读改写串行化（包括首次插入）
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(storage_key)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("lock attempt counter", e))?;

        let previous = sqlx::query_as::<_, AttemptRow>(
            "SELECT count, window_start, expires_at FROM login_attempts WHERE key = $1",
        )
        .bind(storage_key)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("read attempt counter", e))?
        .map(AttemptCounter::from);

        Ok((tx, previous))
    }

    async fn write(
        tx: &mut Transaction<'static, Postgres>,
        storage_key: &str,
        counter: &AttemptCounter,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (key, count, window_start, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO UPDATE
            SET count = EXCLUDED.count, window_start = EXCLUDED.window_start,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(storage_key)
        .bind(i32::try_from(counter.count).unwrap_or(i32::MAX))
        .bind(counter.window_start)
        .bind(counter.expires_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("write attempt counter", e))?;

        Ok(())
    }
}

#[async_trait]
impl AttemptCounterRepository for PostgresAttemptCounterRepository {
    async fn reserve(
        &self,
        key: &AttemptKey,
        policy: &WindowPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let storage_key = key.storage_key();
        let (mut tx, previous) = self.lock_key(&storage_key).await?;

        let reservation = reserve_window(previous, policy, now);
        if let Reservation::Granted(counter) = &reservation {
            Self::write(&mut tx, &storage_key, counter).await?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit attempt counter", e))?;

        Ok(reservation)
    }

    async fn release(&self, key: &AttemptKey, now: DateTime<Utc>) -> AppResult<()> {
        let storage_key = key.storage_key();
        let (mut tx, previous) = self.lock_key(&storage_key).await?;

        match release_window(previous, now) {
            Some(counter) => Self::write(&mut tx, &storage_key, &counter).await?,
            None => {
                sqlx::query("DELETE FROM login_attempts WHERE key = $1")
                    .bind(&storage_key)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| db_error("delete attempt counter", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit attempt counter", e))?;

        Ok(())
    }

    async fn reset(&self, key: &AttemptKey) -> AppResult<()> {
        sqlx::query("DELETE FROM login_attempts WHERE key = $1")
            .bind(key.storage_key())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("reset attempt counter", e))?;

        Ok(())
    }

    async fn find(
        &self,
        key: &AttemptKey,
        now: DateTime<Utc>,
    ) -> AppResult<Option<AttemptCounter>> {
        let row = sqlx::query_as::<_, AttemptRow>(
            "SELECT count, window_start, expires_at FROM login_attempts \
             WHERE key = $1 AND expires_at > $2",
        )
        .bind(key.storage_key())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find attempt counter", e))?;

        Ok(row.map(AttemptCounter::from))
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("prune attempt counters", e))?;

        Ok(result.rows_affected())
    }
}
