//! 外部凭证存储
//!
//! 账号、密码哈希与账号状态由身份服务管理，这里只定义会话核心所需的查询。

use aegis_common::UserId;
use aegis_errors::AppResult;
use async_trait::async_trait;
use secrecy::Secret;

/// 账号状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Disabled,
    Banned,
}

impl UserStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// 按登录标识查到的账号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub user_id: UserId,
    pub two_factor_enabled: bool,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_account(&self, identity: &str) -> AppResult<Option<UserAccount>>;

    async fn verify_password(&self, user_id: &UserId, password: &Secret<String>) -> AppResult<bool>;

    async fn user_status(&self, user_id: &UserId) -> AppResult<UserStatus>;
}
