//! 认证协调器
//!
//! 对外的 login / refresh / logout / validate 入口，按固定顺序编排锁定检查、凭证校验、
//! 会话、令牌与审计。启动时构造一次，以值的形式注入到需要的地方。

use std::sync::Arc;

use aegis_auth_core::{Claims, IssuedTokens, TokenError, TokenIssuer};
use aegis_common::{Clock, SessionId, UserId};
use tracing::{info, warn};

use super::dto::{AuthResult, LoginCommand, LoginOutcome, TwoFactorCommand, ValidatedIdentity};
use crate::domain::entities::{
    AttemptKey, NewSession, RiskLevel, SecurityEvent, SecurityEventType, Session, SessionEndReason,
    SessionState,
};
use crate::domain::repositories::{CredentialStore, UserAccount};
use crate::domain::services::{
    LockoutGuard, RevocationRegistry, SecurityEventLog, SessionStore, StoreDeadline,
    SuspiciousActivityDetector,
};
use crate::domain::value_objects::DeviceInfo;
use crate::error::{AuthError, AuthServiceResult};

/// 协调器依赖的领域服务
#[derive(Clone)]
pub struct AuthServices {
    pub tokens: TokenIssuer,
    pub sessions: SessionStore,
    pub revocations: RevocationRegistry,
    pub lockout: LockoutGuard,
    pub detector: SuspiciousActivityDetector,
    pub events: SecurityEventLog,
    pub clock: Arc<dyn Clock>,
    pub deadline: StoreDeadline,
}

fn result_label<T>(result: &AuthServiceResult<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.label(),
    }
}

#[derive(Clone)]
pub struct AuthCoordinator {
    credentials: Arc<dyn CredentialStore>,
    services: AuthServices,
}

impl AuthCoordinator {
    pub fn new(credentials: Arc<dyn CredentialStore>, services: AuthServices) -> Self {
        Self { credentials, services }
    }

    pub fn services(&self) -> &AuthServices {
        &self.services
    }

    /// 登录
    ///
    /// 邮箱键与 IP 键任一被锁定即拒绝；密码错误时两个键都计数，成功只清零邮箱键。
    #[tracing::instrument(skip_all, fields(ip_address = %cmd.ip_address))]
    pub async fn login(&self, cmd: LoginCommand) -> AuthServiceResult<LoginOutcome> {
        let result = self.try_login(cmd).await;
        let label = match &result {
            Ok(LoginOutcome::TwoFactorRequired { .. }) => "two_factor_required",
            other => result_label(other),
        };
        metrics::counter!("auth_login_total", "result" => label).increment(1);
        result
    }

    async fn try_login(&self, cmd: LoginCommand) -> AuthServiceResult<LoginOutcome> {
        let s = &self.services;
        let user_agent = cmd.device.user_agent.as_deref();
        let email_key = AttemptKey::login_email(&cmd.identity);
        let ip_key = AttemptKey::login_ip(&cmd.ip_address);

        // 先预占再校验密码，并发的失败尝试不会越过上限
        let Some(permits) = s
            .lockout
            .reserve_all(&[email_key.clone(), ip_key])
            .await?
        else {
            s.events
                .append(
                    SecurityEvent::new(
                        SecurityEventType::LoginBlocked,
                        RiskLevel::Warning,
                        s.clock.now(),
                    )
                    .with_ip_address(&cmd.ip_address)
                    .with_user_agent(user_agent)
                    .with_detail("login attempt rejected by lockout"),
                )
                .await?;
            return Err(AuthError::AccountLocked);
        };

        let (account, verified) = match self.check_password(&cmd).await {
            Ok(checked) => checked,
            Err(e) => {
                s.lockout.release_all(permits).await;
                return Err(e);
            }
        };

        let account = match account {
            Some(account) if verified => account,
            account => {
                for permit in permits {
                    s.lockout.fail(permit);
                }

                let mut event = SecurityEvent::new(
                    SecurityEventType::LoginFailed,
                    RiskLevel::Warning,
                    s.clock.now(),
                )
                .with_ip_address(&cmd.ip_address)
                .with_user_agent(user_agent)
                .with_detail("invalid credentials");
                if let Some(account) = &account {
                    event = event.with_user(account.user_id);
                }
                s.events.append(event).await?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        if let Err(e) = self
            .ensure_active(&account.user_id, &cmd.ip_address, user_agent)
            .await
        {
            s.lockout.release_all(permits).await;
            return Err(e);
        }

        // 成功只清零邮箱键，IP 键退还本次预占
        for permit in permits {
            if permit.key() == &email_key {
                s.lockout.succeed(permit).await?;
            } else {
                s.lockout.release(permit).await?;
            }
        }

        if account.two_factor_enabled {
            s.events
                .append(
                    SecurityEvent::new(
                        SecurityEventType::TwoFactorRequired,
                        RiskLevel::Info,
                        s.clock.now(),
                    )
                    .with_user(account.user_id)
                    .with_ip_address(&cmd.ip_address)
                    .with_user_agent(user_agent),
                )
                .await?;
            return Ok(LoginOutcome::TwoFactorRequired {
                user_id: account.user_id,
            });
        }

        let result = self
            .establish_session(account.user_id, &cmd.device, &cmd.ip_address)
            .await?;
        Ok(LoginOutcome::Authenticated(result))
    }

    /// 查找账号并校验密码；账号不存在时返回 `(None, false)`
    async fn check_password(
        &self,
        cmd: &LoginCommand,
    ) -> AuthServiceResult<(Option<UserAccount>, bool)> {
        let s = &self.services;
        let account = s
            .deadline
            .run(
                "credentials.find_account",
                self.credentials.find_account(&cmd.identity),
            )
            .await?;

        let verified = match &account {
            Some(account) => {
                s.deadline
                    .run(
                        "credentials.verify_password",
                        self.credentials.verify_password(&account.user_id, &cmd.password),
                    )
                    .await?
            }
            None => false,
        };

        Ok((account, verified))
    }

    /// 完成二次验证
    ///
    /// 失败按用户计入 `two_factor` 作用域，成功后与普通登录一样建立会话。
    #[tracing::instrument(skip_all, fields(user_id = %cmd.user_id))]
    pub async fn complete_two_factor(
        &self,
        cmd: TwoFactorCommand,
    ) -> AuthServiceResult<AuthResult> {
        let result = self.try_complete_two_factor(cmd).await;
        metrics::counter!("auth_login_total", "result" => result_label(&result)).increment(1);
        result
    }

    async fn try_complete_two_factor(
        &self,
        cmd: TwoFactorCommand,
    ) -> AuthServiceResult<AuthResult> {
        let s = &self.services;
        let user_agent = cmd.device.user_agent.as_deref();
        let key = AttemptKey::two_factor(&cmd.user_id);

        let Some(permit) = s.lockout.reserve(&key).await? else {
            s.events
                .append(
                    SecurityEvent::new(
                        SecurityEventType::LoginBlocked,
                        RiskLevel::Warning,
                        s.clock.now(),
                    )
                    .with_user(cmd.user_id)
                    .with_ip_address(&cmd.ip_address)
                    .with_user_agent(user_agent)
                    .with_detail("two-factor attempt rejected by lockout"),
                )
                .await?;
            return Err(AuthError::AccountLocked);
        };

        if !cmd.code_valid {
            s.lockout.fail(permit);
            s.events
                .append(
                    SecurityEvent::new(
                        SecurityEventType::TwoFactorFailed,
                        RiskLevel::Warning,
                        s.clock.now(),
                    )
                    .with_user(cmd.user_id)
                    .with_ip_address(&cmd.ip_address)
                    .with_user_agent(user_agent),
                )
                .await?;
            return Err(AuthError::InvalidCredentials);
        }

        if let Err(e) = self
            .ensure_active(&cmd.user_id, &cmd.ip_address, user_agent)
            .await
        {
            s.lockout.release_all(vec![permit]).await;
            return Err(e);
        }
        s.lockout.succeed(permit).await?;

        self.establish_session(cmd.user_id, &cmd.device, &cmd.ip_address)
            .await
    }

    /// 刷新令牌对
    ///
    /// 呈递的刷新令牌必须是会话当前的令牌；已轮换过的令牌再次出现视为重放，整个会话被吊销。
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> AuthServiceResult<AuthResult> {
        let result = self.try_refresh(refresh_token).await;
        metrics::counter!("auth_refresh_total", "result" => result_label(&result)).increment(1);
        result
    }

    async fn try_refresh(&self, refresh_token: &str) -> AuthServiceResult<AuthResult> {
        let s = &self.services;
        let claims = s.tokens.verify_refresh(refresh_token)?;
        let (user_id, session_id, token_id) =
            (claims.user_id()?, claims.session_id()?, claims.token_id()?);

        let session = s.sessions.find(&session_id).await?;
        if session.user_id != user_id {
            return Err(AuthError::TokenMalformed("subject does not own session".to_string()));
        }

        match SessionStore::state_of(&session, s.clock.now()) {
            SessionState::Active => {}
            SessionState::Expired => return Err(AuthError::TokenExpired),
            SessionState::Revoked(_) => return Err(AuthError::TokenRevoked),
        }

        if session.token_id != token_id {
            return Err(self.handle_replay(&session, &claims).await);
        }
        if s.revocations.is_revoked(&token_id).await? {
            return Err(AuthError::TokenRevoked);
        }

        let status = s
            .deadline
            .run("credentials.user_status", self.credentials.user_status(&user_id))
            .await?;
        if !status.is_active() {
            s.sessions
                .deactivate(&session_id, SessionEndReason::AccountDisabled)
                .await?;
            return Err(AuthError::AccountDisabled);
        }

        let tokens = s.tokens.issue(&user_id, &session_id)?;
        match s.sessions.rotate(&session, &token_id, &tokens).await {
            Ok(_) => {}
            Err(AuthError::ReplayDetected) => {
                return Err(self.handle_replay(&session, &claims).await);
            }
            Err(e) => return Err(e),
        }

        s.events
            .append(
                SecurityEvent::new(
                    SecurityEventType::TokenRefreshed,
                    RiskLevel::Info,
                    s.clock.now(),
                )
                .with_user(user_id)
                .with_session(session_id)
                .with_ip_address(&session.ip_address),
            )
            .await?;

        Ok(self.auth_result(&tokens, session_id, user_id))
    }

    /// 重放：吊销整个会话并记录 critical 事件，返回要交给调用方的错误
    async fn handle_replay(&self, session: &Session, claims: &Claims) -> AuthError {
        match self.revoke_replayed(session, claims).await {
            Ok(()) => AuthError::ReplayDetected,
            Err(e) => e,
        }
    }

    async fn revoke_replayed(&self, session: &Session, claims: &Claims) -> AuthServiceResult<()> {
        let s = &self.services;
        metrics::counter!("auth_replay_detected_total").increment(1);
        tracing::error!(
            user_id = %session.user_id,
            session_id = %session.id,
            jti = %claims.jti,
            "Refresh token replay detected, revoking session"
        );

        s.sessions
            .deactivate(&session.id, SessionEndReason::Suspicious)
            .await?;
        let presented = claims.token_id()?;
        s.revocations
            .add(
                presented,
                session.user_id,
                SessionEndReason::Suspicious.revocation_reason(),
                claims.expires_at(),
            )
            .await?;

        s.events
            .append(
                SecurityEvent::new(
                    SecurityEventType::RefreshReplayDetected,
                    RiskLevel::Critical,
                    s.clock.now(),
                )
                .with_user(session.user_id)
                .with_session(session.id)
                .with_ip_address(&session.ip_address)
                .with_detail(format!("reused refresh token {}", presented)),
            )
            .await?;
        Ok(())
    }

    /// 注销
    ///
    /// 幂等：已过期的令牌、已结束或不存在的会话都视为已注销。
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, access_token: &str) -> AuthServiceResult<()> {
        let s = &self.services;
        let claims = match s.tokens.verify_access(access_token) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let (user_id, session_id, token_id) =
            (claims.user_id()?, claims.session_id()?, claims.token_id()?);

        s.revocations
            .add(
                token_id,
                user_id,
                SessionEndReason::Logout.revocation_reason(),
                claims.expires_at(),
            )
            .await?;

        match s.sessions.deactivate(&session_id, SessionEndReason::Logout).await {
            Ok(Some(session)) => {
                info!(user_id = %user_id, session_id = %session_id, "User logged out");
                s.events
                    .append(
                        SecurityEvent::new(
                            SecurityEventType::LoggedOut,
                            RiskLevel::Info,
                            s.clock.now(),
                        )
                        .with_user(user_id)
                        .with_session(session_id)
                        .with_ip_address(&session.ip_address),
                    )
                    .await?;
                Ok(())
            }
            Ok(None) | Err(AuthError::SessionNotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 校验请求携带的访问令牌，供其他服务的中间件建立身份
    ///
    /// IP / User-Agent 漂移只记录并提示重新认证，不吊销会话。
    #[tracing::instrument(skip_all, fields(ip_address = %ip_address))]
    pub async fn validate_request(
        &self,
        access_token: &str,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> AuthServiceResult<ValidatedIdentity> {
        let result = self.try_validate(access_token, ip_address, user_agent).await;
        metrics::counter!("auth_validate_total", "result" => result_label(&result)).increment(1);
        result
    }

    async fn try_validate(
        &self,
        access_token: &str,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> AuthServiceResult<ValidatedIdentity> {
        let s = &self.services;
        let claims = s.tokens.verify_access(access_token)?;
        let (user_id, session_id, token_id) =
            (claims.user_id()?, claims.session_id()?, claims.token_id()?);

        if s.revocations.is_revoked(&token_id).await? {
            return Err(AuthError::TokenRevoked);
        }

        let session = match s.sessions.find(&session_id).await {
            Ok(session) => session,
            Err(AuthError::SessionNotFound) => return Err(AuthError::TokenRevoked),
            Err(e) => return Err(e),
        };
        if session.user_id != user_id {
            return Err(AuthError::TokenMalformed("subject does not own session".to_string()));
        }

        let now = s.clock.now();
        match SessionStore::state_of(&session, now) {
            SessionState::Active => {}
            SessionState::Expired => return Err(AuthError::TokenExpired),
            SessionState::Revoked(_) => return Err(AuthError::TokenRevoked),
        }
        if session.access_token_id != token_id {
            return Err(AuthError::TokenRevoked);
        }

        let risk = s.detector.evaluate(&session, ip_address, user_agent, now);
        if risk.is_elevated() {
            warn!(
                user_id = %user_id,
                session_id = %session_id,
                risk_level = %risk.level,
                reasons = %risk.summary(),
                "Suspicious activity on session"
            );
            s.events
                .append(
                    SecurityEvent::new(SecurityEventType::SuspiciousActivity, risk.level, now)
                        .with_user(user_id)
                        .with_session(session_id)
                        .with_ip_address(ip_address)
                        .with_user_agent(user_agent)
                        .with_detail(risk.summary()),
                )
                .await?;
        }

        s.sessions.touch(&session_id, ip_address, user_agent).await?;

        Ok(ValidatedIdentity {
            user_id,
            session_id,
            risk_level: risk.level,
            step_up_required: risk.requires_step_up(),
        })
    }

    /// 修改密码后结束用户的全部会话
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn on_password_changed(&self, user_id: &UserId) -> AuthServiceResult<usize> {
        self.end_all_sessions(user_id, SessionEndReason::PasswordChange, RiskLevel::Info)
            .await
    }

    /// 账号被禁用后结束用户的全部会话
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn disable_account(&self, user_id: &UserId) -> AuthServiceResult<usize> {
        self.end_all_sessions(user_id, SessionEndReason::AccountDisabled, RiskLevel::Warning)
            .await
    }

    async fn end_all_sessions(
        &self,
        user_id: &UserId,
        reason: SessionEndReason,
        risk_level: RiskLevel,
    ) -> AuthServiceResult<usize> {
        let s = &self.services;
        let ended = s.sessions.deactivate_all_for_user(user_id, reason).await?;

        s.events
            .append(
                SecurityEvent::new(SecurityEventType::SessionsRevoked, risk_level, s.clock.now())
                    .with_user(*user_id)
                    .with_detail(format!("{} sessions ended: {}", ended.len(), reason)),
            )
            .await?;

        Ok(ended.len())
    }

    /// 用户当前的活跃会话（设备列表）
    pub async fn list_sessions(&self, user_id: &UserId) -> AuthServiceResult<Vec<Session>> {
        self.services.sessions.list_active(user_id).await
    }

    /// 注销指定设备；会话不属于该用户时视为不存在
    #[tracing::instrument(skip_all, fields(user_id = %user_id, session_id = %session_id))]
    pub async fn revoke_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> AuthServiceResult<()> {
        let s = &self.services;
        let session = s.sessions.find(session_id).await?;
        if &session.user_id != user_id {
            return Err(AuthError::SessionNotFound);
        }

        if s.sessions
            .deactivate(session_id, SessionEndReason::RemoteSignOut)
            .await?
            .is_some()
        {
            s.events
                .append(
                    SecurityEvent::new(
                        SecurityEventType::SessionRevoked,
                        RiskLevel::Info,
                        s.clock.now(),
                    )
                    .with_user(*user_id)
                    .with_session(*session_id)
                    .with_detail("signed out remotely"),
                )
                .await?;
        }
        Ok(())
    }

    /// 用户最近的安全事件
    pub async fn recent_security_events(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> AuthServiceResult<Vec<SecurityEvent>> {
        Ok(self.services.events.recent_for_user(user_id, limit).await?)
    }

    async fn ensure_active(
        &self,
        user_id: &UserId,
        ip_address: &str,
        user_agent: Option<&str>,
    ) -> AuthServiceResult<()> {
        let s = &self.services;
        let status = s
            .deadline
            .run("credentials.user_status", self.credentials.user_status(user_id))
            .await?;
        if status.is_active() {
            return Ok(());
        }

        s.events
            .append(
                SecurityEvent::new(
                    SecurityEventType::LoginFailed,
                    RiskLevel::Warning,
                    s.clock.now(),
                )
                .with_user(*user_id)
                .with_ip_address(ip_address)
                .with_user_agent(user_agent)
                .with_detail(format!("account not active: {:?}", status)),
            )
            .await?;
        Err(AuthError::AccountDisabled)
    }

    async fn establish_session(
        &self,
        user_id: UserId,
        device: &DeviceInfo,
        ip_address: &str,
    ) -> AuthServiceResult<AuthResult> {
        let s = &self.services;
        let session_id = SessionId::new();
        let tokens = s.tokens.issue(&user_id, &session_id)?;

        let created = match s
            .sessions
            .create(NewSession {
                id: session_id,
                user_id,
                token_id: tokens.refresh_token_id,
                access_token_id: tokens.access_token_id,
                device_fingerprint: device.fingerprint(),
                ip_address: ip_address.to_string(),
                user_agent: device.user_agent.clone(),
                expires_at: tokens.refresh_expires_at,
                access_expires_at: tokens.access_expires_at,
            })
            .await
        {
            Ok(created) => created,
            Err(e) => {
                // 超时时写入可能已经生效
                self.abort_session(&session_id).await;
                return Err(e);
            }
        };

        // 会话已落库：之后任何一步失败都要把它作废，客户端从未拿到令牌
        if let Err(e) = self
            .record_login(user_id, session_id, &created.evicted, device, ip_address)
            .await
        {
            self.abort_session(&session_id).await;
            return Err(e);
        }

        info!(user_id = %user_id, session_id = %session_id, "User logged in");
        Ok(self.auth_result(&tokens, session_id, user_id))
    }

    async fn record_login(
        &self,
        user_id: UserId,
        session_id: SessionId,
        evicted: &[Session],
        device: &DeviceInfo,
        ip_address: &str,
    ) -> AuthServiceResult<()> {
        let s = &self.services;
        let now = s.clock.now();
        for evicted in evicted {
            s.events
                .append(
                    SecurityEvent::new(SecurityEventType::SessionEvicted, RiskLevel::Info, now)
                        .with_user(user_id)
                        .with_session(evicted.id)
                        .with_detail(format!(
                            "evicted by session limit of {}",
                            s.sessions.max_sessions()
                        )),
                )
                .await?;
        }

        s.events
            .append(
                SecurityEvent::new(SecurityEventType::LoginSucceeded, RiskLevel::Info, now)
                    .with_user(user_id)
                    .with_session(session_id)
                    .with_ip_address(ip_address)
                    .with_user_agent(device.user_agent.as_deref()),
            )
            .await?;
        Ok(())
    }

    async fn abort_session(&self, session_id: &SessionId) {
        match self
            .services
            .sessions
            .deactivate(session_id, SessionEndReason::Aborted)
            .await
        {
            Ok(Some(_)) => {
                warn!(session_id = %session_id, "Login aborted after session was created")
            }
            Ok(None) | Err(AuthError::SessionNotFound) => {}
            Err(e) => tracing::error!(
                session_id = %session_id,
                error = %e,
                "Failed to abort session of a failed login"
            ),
        }
    }

    fn auth_result(
        &self,
        tokens: &IssuedTokens,
        session_id: SessionId,
        user_id: UserId,
    ) -> AuthResult {
        AuthResult {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            token_type: "Bearer".to_string(),
            access_expires_in: self.services.tokens.access_ttl().num_seconds(),
            refresh_expires_in: self.services.tokens.refresh_ttl().num_seconds(),
            session_id,
            user_id,
        }
    }
}
