//! IAM Session 维护进程
//!
//! 加载配置与密钥、连接存储，并运行定期清理直到收到 Ctrl-C。

use std::sync::Arc;
use std::time::Duration;

use aegis_auth_core::{KeyMaterial, SigningAlgorithm};
use aegis_common::{Clock, SystemClock};
use aegis_config::AppConfig;
use anyhow::Context;
use iam_session::application::AuthServices;
use iam_session::infrastructure::bootstrap::AuthRepositories;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = AppConfig::load(&config_dir).context("failed to load configuration")?;

    if config.telemetry.json {
        aegis_telemetry::init_tracing_json(&config.telemetry.log_level)?;
    } else {
        aegis_telemetry::init_tracing(&config.telemetry.log_level)?;
    }
    let metrics = aegis_telemetry::init_metrics()?;

    info!(app_name = %config.app_name, app_env = %config.app_env, "Starting iam-session");

    // 密钥只在启动时读取一次，读取失败直接退出
    let algorithm: SigningAlgorithm = config.keys.algorithm.parse()?;
    let keys = KeyMaterial::load(
        algorithm,
        &config.keys.private_key_path,
        &config.keys.public_key_path,
    )
    .context("failed to load signing keys")?;
    info!(algorithm = ?keys.algorithm(), "Signing keys loaded");

    let repos = AuthRepositories::connect(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = AuthServices::assemble(&config, Arc::new(keys), &repos, clock);

    let shutdown = CancellationToken::new();
    let interval = Duration::from_secs(config.cleanup.interval_secs);
    let cleanup = Arc::new(services.cleanup_task(interval));
    let handle = cleanup.start(shutdown.clone());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    shutdown.cancel();
    handle.await.context("cleanup task panicked")?;

    tracing::debug!(metrics = %metrics.render(), "Final metrics snapshot");
    info!("iam-session stopped");
    Ok(())
}
