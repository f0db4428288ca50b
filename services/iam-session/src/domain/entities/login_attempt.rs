//! 登录尝试计数

use aegis_common::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 计数作用域（接口类别）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptScope {
    Login,
    TwoFactor,
}

impl AttemptScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::TwoFactor => "two_factor",
        }
    }
}

/// 计数主体
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptIdentity {
    Email(String),
    Ip(String),
    User(UserId),
}

/// 计数键 `(identity, scope)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptKey {
    pub scope: AttemptScope,
    pub identity: AttemptIdentity,
}

impl AttemptKey {
    /// 登录邮箱键，大小写与首尾空白不区分
    pub fn login_email(email: &str) -> Self {
        Self {
            scope: AttemptScope::Login,
            identity: AttemptIdentity::Email(email.trim().to_lowercase()),
        }
    }

    pub fn login_ip(ip: &str) -> Self {
        Self {
            scope: AttemptScope::Login,
            identity: AttemptIdentity::Ip(ip.trim().to_string()),
        }
    }

    pub fn two_factor(user_id: &UserId) -> Self {
        Self {
            scope: AttemptScope::TwoFactor,
            identity: AttemptIdentity::User(*user_id),
        }
    }

    /// 存储用的字符串键
    pub fn storage_key(&self) -> String {
        let identity = match &self.identity {
            AttemptIdentity::Email(email) => format!("email:{}", email),
            AttemptIdentity::Ip(ip) => format!("ip:{}", ip),
            AttemptIdentity::User(user_id) => format!("user:{}", user_id),
        };
        format!("attempt:{}:{}", self.scope.as_str(), identity)
    }
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// 一个窗口内的失败计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCounter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// 预占一次尝试的结果
///
/// `Granted` 带的是已计入本次尝试后的计数；`Denied` 时计数未变。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted(AttemptCounter),
    Denied(AttemptCounter),
}
