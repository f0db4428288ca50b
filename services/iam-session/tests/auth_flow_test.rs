mod common;

use std::time::Duration as StdDuration;

use aegis_common::Clock;
use aegis_errors::AppError;
use chrono::Duration;
use std::sync::Arc;

use common::{FailingEventRepository, IP, PASSWORD, TestHarness, USER_AGENT, device};
use iam_session::application::{LoginOutcome, TwoFactorCommand};
use iam_session::domain::entities::{RiskLevel, SecurityEventType, SessionEndReason, SessionState};
use iam_session::domain::repositories::{SessionRepository, UserStatus};
use iam_session::domain::services::SessionStore;
use iam_session::error::AuthError;
use iam_session::infrastructure::bootstrap::AuthRepositories;

const EMAIL: &str = "a@b.com";

#[tokio::test]
async fn test_login_then_validate_round_trip() {
    let h = TestHarness::new();
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);

    let result = h.login_ok(EMAIL, device(1)).await;
    assert_eq!(result.user_id, user_id);
    assert_eq!(result.token_type, "Bearer");
    assert_eq!(result.access_expires_in, 3600);
    assert_eq!(result.refresh_expires_in, 604800);

    let identity = h
        .coordinator
        .validate_request(&result.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap();
    assert_eq!(identity.user_id, user_id);
    assert_eq!(identity.session_id, result.session_id);
    assert_eq!(identity.risk_level, RiskLevel::Info);
    assert!(!identity.step_up_required);
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let h = TestHarness::new();
    h.credentials.add_user(EMAIL, PASSWORD);
    let result = h.login_ok(EMAIL, device(1)).await;

    let err = h
        .coordinator
        .validate_request(&result.refresh_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenMalformed(_)));

    let err = h.coordinator.refresh(&result.access_token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenMalformed(_)));
}

#[tokio::test]
async fn test_lockout_blocks_correct_password_until_it_expires() {
    let h = TestHarness::with_config(
        "[lockout]\nmax_failed_attempts = 5\nwindow_secs = 60\nlockout_duration_secs = 300\n",
    );
    h.credentials.add_user(EMAIL, PASSWORD);

    for _ in 0..5 {
        let err = h.login(EMAIL, "wrong", IP, device(1)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        h.advance(Duration::seconds(5));
    }

    let err = h.login(EMAIL, PASSWORD, IP, device(1)).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked));

    h.advance(Duration::seconds(301));
    let outcome = h.login(EMAIL, PASSWORD, IP, device(1)).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_email_lock_applies_from_any_ip() {
    let h = TestHarness::with_config("[lockout]\nmax_failed_attempts = 3\n");
    h.credentials.add_user(EMAIL, PASSWORD);

    for i in 0..3 {
        let ip = format!("10.0.0.{}", i);
        h.login(EMAIL, "wrong", &ip, device(1)).await.unwrap_err();
    }

    let err = h.login(EMAIL, PASSWORD, "172.16.0.1", device(1)).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked));
}

#[tokio::test]
async fn test_ip_lock_blocks_other_accounts() {
    let h = TestHarness::with_config("[lockout]\nmax_failed_attempts = 3\n");
    h.credentials.add_user("victim@b.com", PASSWORD);

    for i in 0..3 {
        let email = format!("user{}@b.com", i);
        h.login(&email, "guess", IP, device(1)).await.unwrap_err();
    }

    let err = h.login("victim@b.com", PASSWORD, IP, device(1)).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked));

    let outcome = h.login("victim@b.com", PASSWORD, "10.9.9.9", device(1)).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_success_resets_email_failures() {
    let h = TestHarness::with_config("[lockout]\nmax_failed_attempts = 5\n");
    h.credentials.add_user(EMAIL, PASSWORD);

    for _ in 0..4 {
        h.login(EMAIL, "wrong", "10.0.0.1", device(1)).await.unwrap_err();
    }
    h.login(EMAIL, PASSWORD, "10.0.0.1", device(1)).await.unwrap();

    // 如果邮箱计数没有清零，这里第 5 次失败后就会被锁定
    for _ in 0..4 {
        h.login(EMAIL, "wrong", "10.0.0.2", device(1)).await.unwrap_err();
    }
    let outcome = h.login(EMAIL, PASSWORD, "10.0.0.2", device(1)).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
}

#[tokio::test]
async fn test_failed_login_does_not_leak_account_existence() {
    let h = TestHarness::new();
    h.credentials.add_user(EMAIL, PASSWORD);

    let unknown = h.login("nobody@b.com", PASSWORD, IP, device(1)).await.unwrap_err();
    let wrong = h.login(EMAIL, "wrong", IP, device(1)).await.unwrap_err();
    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(wrong, AuthError::InvalidCredentials));

    let unknown: AppError = unknown.into();
    let wrong: AppError = wrong.into();
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[tokio::test]
async fn test_sixth_login_evicts_least_recently_active_session() {
    let h = TestHarness::with_config("[session]\nmax_sessions_per_user = 5\n");
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);

    let mut logins = Vec::new();
    for n in 0..5 {
        logins.push(h.login_ok(EMAIL, device(n)).await);
        h.advance(Duration::seconds(1));
    }

    // 第一台设备最近有活动，第二台成为最久未活动
    h.coordinator
        .validate_request(&logins[0].access_token, IP, Some(USER_AGENT))
        .await
        .unwrap();
    h.advance(Duration::seconds(1));

    let sixth = h.login_ok(EMAIL, device(5)).await;

    let active = h.coordinator.list_sessions(&user_id).await.unwrap();
    assert_eq!(active.len(), 5);
    assert!(active.iter().any(|s| s.id == sixth.session_id));
    assert!(!active.iter().any(|s| s.id == logins[1].session_id));

    let evicted = h.repos.sessions.find_by_id(&logins[1].session_id).await.unwrap().unwrap();
    assert_eq!(
        SessionStore::state_of(&evicted, h.clock.now()),
        SessionState::Revoked(SessionEndReason::Evicted)
    );

    let err = h
        .coordinator
        .validate_request(&logins[1].access_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));

    h.coordinator
        .validate_request(&logins[0].access_token, IP, Some(USER_AGENT))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_logout_revokes_access_token() {
    let h = TestHarness::new();
    h.credentials.add_user(EMAIL, PASSWORD);
    let result = h.login_ok(EMAIL, device(1)).await;

    h.coordinator.logout(&result.access_token).await.unwrap();

    let err = h
        .coordinator
        .validate_request(&result.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));

    // 重复注销是幂等的
    h.coordinator.logout(&result.access_token).await.unwrap();

    let err = h.coordinator.refresh(&result.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));
}

#[tokio::test]
async fn test_logout_with_expired_token_is_a_no_op() {
    let h = TestHarness::with_config("[session]\naccess_ttl_secs = 60\n");
    h.credentials.add_user(EMAIL, PASSWORD);
    let result = h.login_ok(EMAIL, device(1)).await;

    h.advance(Duration::seconds(61));
    let err = h
        .coordinator
        .validate_request(&result.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));

    h.coordinator.logout(&result.access_token).await.unwrap();
}

#[tokio::test]
async fn test_password_change_revokes_every_session() {
    let h = TestHarness::new();
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);
    let logins = vec![
        h.login_ok(EMAIL, device(1)).await,
        h.login_ok(EMAIL, device(2)).await,
        h.login_ok(EMAIL, device(3)).await,
    ];

    let ended = h.coordinator.on_password_changed(&user_id).await.unwrap();
    assert_eq!(ended, 3);

    for login in &logins {
        let session = h.repos.sessions.find_by_id(&login.session_id).await.unwrap().unwrap();
        assert_eq!(
            SessionStore::state_of(&session, h.clock.now()),
            SessionState::Revoked(SessionEndReason::PasswordChange)
        );

        let err = h
            .coordinator
            .validate_request(&login.access_token, IP, Some(USER_AGENT))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));

        let err = h.coordinator.refresh(&login.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    // 新登录不受影响
    h.login_ok(EMAIL, device(4)).await;
}

#[tokio::test]
async fn test_refresh_rotates_and_replay_revokes_session() {
    let h = TestHarness::new();
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);
    let first = h.login_ok(EMAIL, device(1)).await;

    h.advance(Duration::minutes(10));
    let second = h.coordinator.refresh(&first.refresh_token).await.unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_ne!(second.refresh_token, first.refresh_token);

    let session = h.repos.sessions.find_by_id(&first.session_id).await.unwrap().unwrap();
    assert_eq!(session.last_activity, h.clock.now());
    assert_eq!(session.expires_at, h.clock.now() + Duration::days(7));

    // 旧的访问令牌随轮换失效
    let err = h
        .coordinator
        .validate_request(&first.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));
    h.coordinator
        .validate_request(&second.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap();

    // 再次使用已轮换的刷新令牌
    let err = h.coordinator.refresh(&first.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::ReplayDetected));

    let session = h.repos.sessions.find_by_id(&first.session_id).await.unwrap().unwrap();
    assert_eq!(
        SessionStore::state_of(&session, h.clock.now()),
        SessionState::Revoked(SessionEndReason::Suspicious)
    );

    let err = h
        .coordinator
        .validate_request(&second.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));
    let err = h.coordinator.refresh(&second.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));

    let events = h.coordinator.recent_security_events(&user_id, 50).await.unwrap();
    let replay = events
        .iter()
        .find(|e| e.event_type == SecurityEventType::RefreshReplayDetected)
        .expect("replay should be audited");
    assert_eq!(replay.risk_level, RiskLevel::Critical);
    assert_eq!(replay.session_id, Some(first.session_id));
}

#[tokio::test]
async fn test_two_factor_gate_and_lockout() {
    let h = TestHarness::with_config("[lockout]\nmax_two_factor_attempts = 3\n");
    let user_id = h.credentials.add_user_with_two_factor(EMAIL, PASSWORD);

    let outcome = h.login(EMAIL, PASSWORD, IP, device(1)).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::TwoFactorRequired { user_id: id } if id == user_id));
    assert!(h.coordinator.list_sessions(&user_id).await.unwrap().is_empty());

    let attempt = |code_valid| TwoFactorCommand {
        user_id,
        code_valid,
        device: device(1),
        ip_address: IP.to_string(),
    };

    for _ in 0..3 {
        let err = h.coordinator.complete_two_factor(attempt(false)).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
    let err = h.coordinator.complete_two_factor(attempt(true)).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked));

    h.advance(Duration::seconds(1801));
    let result = h.coordinator.complete_two_factor(attempt(true)).await.unwrap();
    assert_eq!(result.user_id, user_id);
    h.coordinator
        .validate_request(&result.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_disabled_account_cannot_login_or_refresh() {
    let h = TestHarness::new();
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);
    let result = h.login_ok(EMAIL, device(1)).await;

    h.credentials.set_status(&user_id, UserStatus::Banned);

    let err = h.login(EMAIL, PASSWORD, IP, device(2)).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));

    let err = h.coordinator.refresh(&result.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));

    let session = h.repos.sessions.find_by_id(&result.session_id).await.unwrap().unwrap();
    assert_eq!(
        SessionStore::state_of(&session, h.clock.now()),
        SessionState::Revoked(SessionEndReason::AccountDisabled)
    );
}

#[tokio::test]
async fn test_disable_account_ends_sessions() {
    let h = TestHarness::new();
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);
    let result = h.login_ok(EMAIL, device(1)).await;

    assert_eq!(h.coordinator.disable_account(&user_id).await.unwrap(), 1);
    let err = h
        .coordinator
        .validate_request(&result.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));
}

#[tokio::test]
async fn test_ip_drift_is_advisory() {
    let h = TestHarness::new();
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);
    let result = h.login_ok(EMAIL, device(1)).await;

    let identity = h
        .coordinator
        .validate_request(&result.access_token, "203.0.113.9", Some(USER_AGENT))
        .await
        .unwrap();
    assert_eq!(identity.risk_level, RiskLevel::High);
    assert!(identity.step_up_required);

    // 会话仍然可用，并记录最新的来源
    let session = h.repos.sessions.find_by_id(&result.session_id).await.unwrap().unwrap();
    assert!(session.active);
    assert_eq!(session.ip_address, "203.0.113.9");

    let events = h.coordinator.recent_security_events(&user_id, 10).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == SecurityEventType::SuspiciousActivity
        && e.risk_level == RiskLevel::High));
}

#[tokio::test]
async fn test_inactivity_is_a_warning() {
    let h = TestHarness::with_config(
        "[session]\naccess_ttl_secs = 172800\nrefresh_ttl_secs = 604800\n",
    );
    h.credentials.add_user(EMAIL, PASSWORD);
    let result = h.login_ok(EMAIL, device(1)).await;

    h.advance(Duration::hours(25));
    let identity = h
        .coordinator
        .validate_request(&result.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap();
    assert_eq!(identity.risk_level, RiskLevel::Warning);
    assert!(!identity.step_up_required);
}

#[tokio::test]
async fn test_device_management() {
    let h = TestHarness::new();
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);
    let other_id = h.credentials.add_user("other@b.com", PASSWORD);
    let phone = h.login_ok(EMAIL, device(1)).await;
    let laptop = h.login_ok(EMAIL, device(2)).await;

    assert_eq!(h.coordinator.list_sessions(&user_id).await.unwrap().len(), 2);

    let err = h
        .coordinator
        .revoke_session(&other_id, &phone.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::SessionNotFound));

    h.coordinator.revoke_session(&user_id, &phone.session_id).await.unwrap();
    let remaining = h.coordinator.list_sessions(&user_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, laptop.session_id);

    let err = h
        .coordinator
        .validate_request(&phone.access_token, IP, Some(USER_AGENT))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenRevoked));
}

#[tokio::test(start_paused = true)]
async fn test_slow_credential_store_fails_closed() {
    let h = TestHarness::with_config("[storage]\ntimeout_ms = 100\n");
    h.credentials.add_user(EMAIL, PASSWORD);
    h.credentials.set_delay(StdDuration::from_secs(10));

    let err = h.login(EMAIL, PASSWORD, IP, device(1)).await.unwrap_err();
    assert!(matches!(err, AuthError::Infrastructure(AppError::Timeout(_))));
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn test_failed_login_audit_deactivates_the_new_session() {
    let mut repos = AuthRepositories::in_memory();
    let events = Arc::new(FailingEventRepository::new(
        repos.events.clone(),
        SecurityEventType::LoginSucceeded,
    ));
    repos.events = events.clone();
    let h = TestHarness::with_repositories("", repos);
    let user_id = h.credentials.add_user(EMAIL, PASSWORD);

    let err = h.login(EMAIL, PASSWORD, IP, device(1)).await.unwrap_err();
    assert!(matches!(err, AuthError::Infrastructure(AppError::Database(_))));
    assert!(h.coordinator.list_sessions(&user_id).await.unwrap().is_empty());

    let rejected = events.rejected();
    assert_eq!(rejected.len(), 1);
    let session_id = rejected[0].session_id.unwrap();
    let session = h.repos.sessions.find_by_id(&session_id).await.unwrap().unwrap();
    assert_eq!(
        SessionStore::state_of(&session, h.clock.now()),
        SessionState::Revoked(SessionEndReason::Aborted)
    );
}
