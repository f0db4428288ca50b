//! telemetry - 可观测性库

use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    #[error("Failed to install Prometheus recorder: {0}")]
    Metrics(#[from] BuildError),
}

/// 初始化 tracing
pub fn init_tracing(log_level: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 初始化 Prometheus metrics
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_auth_metrics();
    Ok(handle)
}

/// 注册认证相关指标的说明
pub fn describe_auth_metrics() {
    describe_counter!("auth_login_total", Unit::Count, "Login attempts by result");
    describe_counter!("auth_refresh_total", Unit::Count, "Token refreshes by result");
    describe_counter!(
        "auth_validate_total",
        Unit::Count,
        "Access token validations by result"
    );
    describe_counter!(
        "auth_sessions_evicted_total",
        Unit::Count,
        "Sessions evicted to honour the per-user session limit"
    );
    describe_counter!(
        "auth_replay_detected_total",
        Unit::Count,
        "Reuse of already-rotated refresh tokens"
    );
    describe_counter!(
        "auth_lockouts_total",
        Unit::Count,
        "Keys that crossed the lockout threshold"
    );
    describe_counter!(
        "auth_cleanup_sessions_total",
        Unit::Count,
        "Sessions expired or purged by the cleanup task"
    );
    describe_counter!(
        "auth_cleanup_revocations_total",
        Unit::Count,
        "Revocation entries pruned by the cleanup task"
    );
    describe_counter!(
        "auth_security_events_total",
        Unit::Count,
        "Security events appended by risk level"
    );
}
