//! Redis 连接

use aegis_errors::{AppError, AppResult};
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

/// 建立连接管理器并 PING 一次
///
/// 连不上直接报错，启动阶段不重试。
pub async fn connect(url: &str) -> AppResult<ConnectionManager> {
    let client = Client::open(url)
        .map_err(|e| AppError::external_service(format!("Invalid Redis URL: {}", e)))?;

    let mut conn = ConnectionManager::new(client)
        .await
        .map_err(|e| AppError::external_service(format!("Failed to connect to Redis: {}", e)))?;

    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| AppError::external_service(format!("Redis PING failed: {}", e)))?;

    info!("Redis connection established");
    Ok(conn)
}
