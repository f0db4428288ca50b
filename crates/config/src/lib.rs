//! aegis-config - 配置加载库
//!
//! 加载顺序：`{dir}/default.toml` → `{dir}/{APP_ENV}.toml` → `APP__` 前缀的环境变量
//! （以 `__` 分隔层级，例如 `APP__SESSION__MAX_SESSIONS_PER_USER=3`）。

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

use secrecy::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// 存储后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// 登录尝试计数后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockoutBackend {
    #[default]
    Memory,
    /// 与会话共用 `storage.database`
    Postgres,
    Redis,
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

/// 会话 / 令牌 / 审计存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// 单次存储调用的超时（毫秒），超时即拒绝
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
    pub database: Option<DatabaseConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            timeout_ms: default_store_timeout_ms(),
            database: None,
        }
    }
}

fn default_store_timeout_ms() -> u64 {
    2000
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

/// 登录尝试计数存储配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockoutStoreConfig {
    #[serde(default)]
    pub backend: LockoutBackend,
    pub redis: Option<RedisConfig>,
}

/// 签名密钥配置（PEM 文件，启动时读取一次）
#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub private_key_path: String,
    pub public_key_path: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_algorithm() -> String {
    "EdDSA".to_string()
}

fn default_issuer() -> String {
    "iam-session".to_string()
}

fn default_audience() -> String {
    "aegis".to_string()
}

/// 会话策略配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,
    #[serde(default = "default_max_sessions_per_user")]
    pub max_sessions_per_user: usize,
    /// 静默超过该时长后再次出现视为可疑
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
    /// 已停用会话在清理前的保留时长
    #[serde(default = "default_purge_after_secs")]
    pub purge_after_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: default_access_ttl_secs(),
            refresh_ttl_secs: default_refresh_ttl_secs(),
            max_sessions_per_user: default_max_sessions_per_user(),
            inactivity_threshold_secs: default_inactivity_threshold_secs(),
            purge_after_secs: default_purge_after_secs(),
        }
    }
}

fn default_access_ttl_secs() -> u64 {
    3600
}

fn default_refresh_ttl_secs() -> u64 {
    604800
}

fn default_max_sessions_per_user() -> usize {
    5
}

fn default_inactivity_threshold_secs() -> u64 {
    86400
}

fn default_purge_after_secs() -> u64 {
    604800
}

/// 暴力破解防护配置
#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    /// 失败计数窗口（秒）
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// 达到阈值后的锁定时长（秒）
    #[serde(default = "default_lockout_duration_secs")]
    pub lockout_duration_secs: u64,
    #[serde(default = "default_max_failed_attempts")]
    pub max_two_factor_attempts: u32,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            window_secs: default_window_secs(),
            lockout_duration_secs: default_lockout_duration_secs(),
            max_two_factor_attempts: default_max_failed_attempts(),
        }
    }
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    900
}

fn default_lockout_duration_secs() -> u64 {
    1800
}

/// 定期清理配置
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出 JSON 日志（生产环境）
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub lockout_store: LockoutStoreConfig,
    pub keys: KeyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP__").split("__"));

        Self::from_figment(figment)
    }

    /// 从任意 figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_sessions_per_user == 0 {
            return Err(ConfigError::Invalid(
                "session.max_sessions_per_user must be at least 1".to_string(),
            ));
        }
        if self.session.access_ttl_secs == 0 || self.session.refresh_ttl_secs == 0 {
            return Err(ConfigError::Invalid("token TTLs must be positive".to_string()));
        }
        if self.session.access_ttl_secs > self.session.refresh_ttl_secs {
            return Err(ConfigError::Invalid(
                "session.access_ttl_secs must not exceed session.refresh_ttl_secs".to_string(),
            ));
        }
        if self.lockout.max_failed_attempts == 0 || self.lockout.max_two_factor_attempts == 0 {
            return Err(ConfigError::Invalid(
                "lockout attempt limits must be at least 1".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.database.is_none() {
            return Err(ConfigError::Invalid(
                "storage.database is required for the postgres backend".to_string(),
            ));
        }
        if self.lockout_store.backend == LockoutBackend::Postgres
            && self.storage.database.is_none()
        {
            return Err(ConfigError::Invalid(
                "storage.database is required for the postgres lockout backend".to_string(),
            ));
        }
        if self.lockout_store.backend == LockoutBackend::Redis && self.lockout_store.redis.is_none()
        {
            return Err(ConfigError::Invalid(
                "lockout_store.redis is required for the redis backend".to_string(),
            ));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
mod tests;
