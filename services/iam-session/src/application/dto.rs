//! 对外的请求 / 结果类型

use aegis_common::{SessionId, UserId};
use secrecy::Secret;

use crate::domain::entities::RiskLevel;
use crate::domain::value_objects::DeviceInfo;

/// 登录请求
#[derive(Debug, Clone)]
pub struct LoginCommand {
    /// 邮箱或用户名
    pub identity: String,
    pub password: Secret<String>,
    pub device: DeviceInfo,
    pub ip_address: String,
}

/// 二次验证结果（验证码由外部服务校验）
#[derive(Debug, Clone)]
pub struct TwoFactorCommand {
    pub user_id: UserId,
    pub code_valid: bool,
    pub device: DeviceInfo,
    pub ip_address: String,
}

/// 认证成功返回的令牌对
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// 秒
    pub access_expires_in: i64,
    /// 秒
    pub refresh_expires_in: i64,
    pub session_id: SessionId,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(AuthResult),
    /// 需要完成二次验证，尚未创建会话
    TwoFactorRequired { user_id: UserId },
}

/// `validate_request` 建立的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub risk_level: RiskLevel,
    /// 风险为 high 及以上时建议调用方要求重新认证
    pub step_up_required: bool,
}
