//! 存储调用超时

use std::future::Future;
use std::time::Duration;

use aegis_errors::{AppError, AppResult};

/// 每次存储调用的时间上限，超时即失败（拒绝请求）
#[derive(Debug, Clone, Copy)]
pub struct StoreDeadline(Duration);

impl StoreDeadline {
    pub fn new(timeout: Duration) -> Self {
        Self(timeout)
    }

    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn timeout(&self) -> Duration {
        self.0
    }

    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.0, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.0.as_millis() as u64,
                    "Store call timed out"
                );
                Err(AppError::timeout(operation))
            }
        }
    }
}

impl Default for StoreDeadline {
    fn default() -> Self {
        Self::from_millis(2000)
    }
}
