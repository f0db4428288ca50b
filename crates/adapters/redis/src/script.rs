//! 原子脚本执行
//!
//! 计数类操作全部放进一个 Lua 脚本，Redis 单线程执行保证同一个键上的读-改-写不会交错。

use aegis_errors::{AppError, AppResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::debug;

/// 带键前缀的 Redis 客户端
#[derive(Clone)]
pub struct RedisScriptClient {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisScriptClient {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: "aegis".to_string(),
        }
    }

    /// 设置键前缀
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// 生成带前缀的键
    pub fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// 执行返回整数数组的脚本
    pub async fn eval_i64s(
        &self,
        script: &Script,
        keys: &[String],
        args: &[i64],
    ) -> AppResult<Vec<i64>> {
        let mut conn = self.conn.clone();
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(*arg);
        }

        let result: Vec<i64> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis script failed: {}", e)))?;

        debug!(keys = ?keys, result = ?result, "Redis script executed");
        Ok(result)
    }

    /// 读取 hash 中的多个整数字段，键不存在时返回 None
    pub async fn hget_i64s(&self, key: &str, fields: &[&str]) -> AppResult<Option<Vec<i64>>> {
        let mut conn = self.conn.clone();
        let values: Vec<Option<i64>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis HMGET failed: {}", e)))?;

        Ok(values.into_iter().collect())
    }

    /// 删除键
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::external_service(format!("Redis DEL failed: {}", e)))
    }
}

