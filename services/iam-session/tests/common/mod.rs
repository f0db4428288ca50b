#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aegis_auth_core::{KeyMaterial, SigningAlgorithm};
use aegis_common::{ManualClock, UserId};
use aegis_config::AppConfig;
use aegis_errors::{AppError, AppResult};
use async_trait::async_trait;
use figment::Figment;
use figment::providers::{Format, Toml};
use iam_session::application::{
    AuthCoordinator, AuthResult, AuthServices, LoginCommand, LoginOutcome,
};
use iam_session::domain::entities::{SecurityEvent, SecurityEventType};
use iam_session::domain::repositories::{
    CredentialStore, SecurityEventRepository, UserAccount, UserStatus,
};
use iam_session::domain::value_objects::DeviceInfo;
use iam_session::error::AuthServiceResult;
use iam_session::infrastructure::bootstrap::AuthRepositories;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, Secret};

pub const ED25519_PRIVATE: &[u8] = include_bytes!("../fixtures/ed25519_private.pem");
pub const ED25519_PUBLIC: &[u8] = include_bytes!("../fixtures/ed25519_public.pem");

pub const IP: &str = "192.168.1.10";
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh)";
pub const PASSWORD: &str = "correct horse battery staple";

const BASE_CONFIG: &str = r#"
app_name = "iam-session-test"

[keys]
private_key_path = "unused"
public_key_path = "unused"
"#;

struct Account {
    user_id: UserId,
    password: String,
    two_factor_enabled: bool,
    status: UserStatus,
}

/// 内存凭证存储
#[derive(Default)]
pub struct MockCredentialStore {
    accounts: Mutex<HashMap<String, Account>>,
    delay: Mutex<Option<Duration>>,
}

impl MockCredentialStore {
    pub fn add_user(&self, identity: &str, password: &str) -> UserId {
        self.insert(identity, password, false)
    }

    pub fn add_user_with_two_factor(&self, identity: &str, password: &str) -> UserId {
        self.insert(identity, password, true)
    }

    fn insert(&self, identity: &str, password: &str, two_factor_enabled: bool) -> UserId {
        let user_id = UserId::new();
        self.accounts.lock().insert(
            identity.to_lowercase(),
            Account {
                user_id,
                password: password.to_string(),
                two_factor_enabled,
                status: UserStatus::Active,
            },
        );
        user_id
    }

    pub fn set_status(&self, user_id: &UserId, status: UserStatus) {
        for account in self.accounts.lock().values_mut() {
            if &account.user_id == user_id {
                account.status = status;
            }
        }
    }

    /// 让每次调用都先等待一段时间
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    async fn maybe_wait(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CredentialStore for MockCredentialStore {
    async fn find_account(&self, identity: &str) -> AppResult<Option<UserAccount>> {
        self.maybe_wait().await;
        Ok(self
            .accounts
            .lock()
            .get(&identity.to_lowercase())
            .map(|a| UserAccount {
                user_id: a.user_id,
                two_factor_enabled: a.two_factor_enabled,
            }))
    }

    async fn verify_password(
        &self,
        user_id: &UserId,
        password: &Secret<String>,
    ) -> AppResult<bool> {
        self.maybe_wait().await;
        Ok(self
            .accounts
            .lock()
            .values()
            .any(|a| &a.user_id == user_id && a.password == *password.expose_secret()))
    }

    async fn user_status(&self, user_id: &UserId) -> AppResult<UserStatus> {
        self.maybe_wait().await;
        Ok(self
            .accounts
            .lock()
            .values()
            .find(|a| &a.user_id == user_id)
            .map(|a| a.status)
            .unwrap_or(UserStatus::Disabled))
    }
}

/// 指定类型的安全事件写入失败，其余交给内层存储
pub struct FailingEventRepository {
    inner: Arc<dyn SecurityEventRepository>,
    fail_on: SecurityEventType,
    rejected: Mutex<Vec<SecurityEvent>>,
}

impl FailingEventRepository {
    pub fn new(inner: Arc<dyn SecurityEventRepository>, fail_on: SecurityEventType) -> Self {
        Self {
            inner,
            fail_on,
            rejected: Mutex::new(Vec::new()),
        }
    }

    pub fn rejected(&self) -> Vec<SecurityEvent> {
        self.rejected.lock().clone()
    }
}

#[async_trait]
impl SecurityEventRepository for FailingEventRepository {
    async fn append(&self, event: &SecurityEvent) -> AppResult<()> {
        if event.event_type == self.fail_on {
            self.rejected.lock().push(event.clone());
            return Err(AppError::database("security_events insert failed"));
        }
        self.inner.append(event).await
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AppResult<Vec<SecurityEvent>> {
        self.inner.find_by_user_id(user_id, limit).await
    }
}

pub fn device(n: usize) -> DeviceInfo {
    DeviceInfo::new(
        Some(USER_AGENT.to_string()),
        Some("macOS".to_string()),
        Some(format!("device-{}", n)),
    )
}

pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub credentials: Arc<MockCredentialStore>,
    pub repos: AuthRepositories,
    pub coordinator: AuthCoordinator,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config("")
    }

    /// `extra` 是追加到基础配置后面的 TOML 片段
    pub fn with_config(extra: &str) -> Self {
        Self::with_repositories(extra, AuthRepositories::in_memory())
    }

    pub fn with_repositories(extra: &str, repos: AuthRepositories) -> Self {
        let toml = format!("{}\n{}", BASE_CONFIG, extra);
        let config = AppConfig::from_figment(Figment::new().merge(Toml::string(&toml)))
            .expect("test config should be valid");
        let keys = KeyMaterial::from_pem(SigningAlgorithm::EdDSA, ED25519_PRIVATE, ED25519_PUBLIC)
            .expect("fixture keys should load");

        let clock = Arc::new(ManualClock::starting_now());
        let credentials = Arc::new(MockCredentialStore::default());
        let services = AuthServices::assemble(&config, Arc::new(keys), &repos, clock.clone());
        let coordinator = AuthCoordinator::new(credentials.clone(), services);

        Self {
            clock,
            credentials,
            repos,
            coordinator,
        }
    }

    pub async fn login(
        &self,
        identity: &str,
        password: &str,
        ip: &str,
        device: DeviceInfo,
    ) -> AuthServiceResult<LoginOutcome> {
        self.coordinator
            .login(LoginCommand {
                identity: identity.to_string(),
                password: Secret::new(password.to_string()),
                device,
                ip_address: ip.to_string(),
            })
            .await
    }

    /// 登录并期望直接拿到令牌
    pub async fn login_ok(&self, identity: &str, device: DeviceInfo) -> AuthResult {
        match self.login(identity, PASSWORD, IP, device).await {
            Ok(LoginOutcome::Authenticated(result)) => result,
            other => panic!("expected successful login, got {:?}", other),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.clock.advance(by);
    }
}
