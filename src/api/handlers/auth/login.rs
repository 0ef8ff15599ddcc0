//! Login endpoint: the full gate sequence from throttling to token issuance.
//!
//! Order matters here. The rate limiter runs before anything touches the
//! account, the lockout gate runs before the password comparison so a locked
//! account reveals nothing about credential correctness, and every branch
//! leaves a security event behind.

use anyhow::{Context, anyhow};
use axum::{Json, extract::Extension, http::HeaderMap};
use serde_json::json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthState;
use super::types::{LoginRequest, LoginResponse};
use super::utils::{extract_client_ip, normalize_email, user_agent, valid_email};
use crate::error::AuthError;
use crate::events::{self, SecurityEvent, Severity, kinds};
use crate::guard::lockout::LockoutKind;
use crate::password;
use crate::token::UserRecord;
use crate::twofactor::ChallengeMethod;

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted; tokens issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
        (status = 423, description = "Account locked", body = crate::error::ErrorBody),
        (status = 429, description = "Rate limited", body = crate::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::InvalidCredentials);
    }
    let ip = extract_client_ip(&headers);
    let user_agent = user_agent(&headers);

    // Cheapest gate first; nothing account-specific has been touched yet.
    if let Err(err) = state.limiter().check(&email, ip.as_deref()).await {
        events::record(
            &pool,
            SecurityEvent::new(kinds::LOGIN_RATE_LIMITED, Severity::Warning)
                .with_context(json!({ "email": email, "ip": ip })),
        )
        .await;
        return Err(err);
    }

    let Some(user) = lookup_login_record(&pool, &email).await? else {
        state.limiter().record_attempt(&email, ip.as_deref(), false).await?;
        events::record(
            &pool,
            SecurityEvent::new(kinds::LOGIN_FAILED, Severity::Warning)
                .with_context(json!({ "email": email, "ip": ip, "reason": "unknown_email" })),
        )
        .await;
        return Err(AuthError::InvalidCredentials);
    };

    if !user.is_active {
        state.limiter().record_attempt(&email, ip.as_deref(), false).await?;
        events::record(
            &pool,
            SecurityEvent::new(kinds::LOGIN_FAILED, Severity::Warning)
                .with_user(user.id)
                .with_context(json!({ "ip": ip, "reason": "inactive_account" })),
        )
        .await;
        return Err(AuthError::InvalidCredentials);
    }

    // The lockout gate must fire before the password is ever compared.
    if let Err(err) = state.lockouts().ensure_not_locked(user.id).await {
        events::record(
            &pool,
            SecurityEvent::new(kinds::LOGIN_FAILED, Severity::Warning)
                .with_user(user.id)
                .with_context(json!({ "ip": ip, "reason": "account_locked" })),
        )
        .await;
        return Err(err);
    }

    let password_ok = password::verify_password(&request.password, &user.password_hash)
        .map_err(|err| anyhow!("stored password hash is unusable: {err}"))?;

    if !password_ok {
        state.limiter().record_attempt(&email, ip.as_deref(), false).await?;
        let lockout = state.lockouts().register_failure(user.id, &email).await?;
        match lockout {
            Some(kind) => {
                let severity = match kind {
                    LockoutKind::Temporary => Severity::Warning,
                    LockoutKind::Permanent => Severity::Critical,
                };
                events::record(
                    &pool,
                    SecurityEvent::new(kinds::ACCOUNT_LOCKED, severity)
                        .with_user(user.id)
                        .with_context(json!({ "ip": ip, "lockout_type": kind.as_str() })),
                )
                .await;
            }
            None => {
                events::record(
                    &pool,
                    SecurityEvent::new(kinds::LOGIN_FAILED, Severity::Warning)
                        .with_user(user.id)
                        .with_context(json!({ "ip": ip, "reason": "bad_password" })),
                )
                .await;
            }
        }
        return Err(AuthError::InvalidCredentials);
    }

    // Credentials are good; a success row also breaks any failure streak.
    state.limiter().record_attempt(&email, ip.as_deref(), true).await?;

    let (device, first_seen) = state
        .devices()
        .observe_login(user.id, &request.device, ip.as_deref())
        .await?;
    if first_seen {
        events::record(
            &pool,
            SecurityEvent::new(kinds::DEVICE_REGISTERED, Severity::Info)
                .with_user(user.id)
                .with_context(json!({ "device_id": device.id, "ip": ip })),
        )
        .await;
    }

    let requires_2fa = !device.is_trusted;
    let session = state
        .sessions()
        .create(user.id, Some(device.id), requires_2fa, ip.as_deref())
        .await?;

    let record = UserRecord {
        id: user.id,
        email: email.clone(),
    };
    let pair = state
        .tokens()
        .issue(&record, session.id, ip.as_deref(), user_agent.as_deref())
        .await?;

    if requires_2fa {
        let method = request.method.unwrap_or(ChallengeMethod::Email);
        state
            .two_factor()
            .issue(user.id, session.id, &email, method)
            .await?;
        events::record(
            &pool,
            SecurityEvent::new(kinds::TWO_FACTOR_ISSUED, Severity::Info)
                .with_user(user.id)
                .with_context(json!({ "session_id": session.id, "method": method.as_str() })),
        )
        .await;
    }

    events::record(
        &pool,
        SecurityEvent::new(kinds::LOGIN_SUCCESS, Severity::Info)
            .with_user(user.id)
            .with_context(json!({
                "session_id": session.id,
                "device_id": device.id,
                "ip": ip,
                "requires_2fa": requires_2fa
            })),
    )
    .await;

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        session_id: session.id,
        requires_2fa,
    }))
}

/// The slice of the platform-owned user row the login path needs.
struct LoginRecord {
    id: Uuid,
    password_hash: String,
    is_active: bool,
}

async fn lookup_login_record(pool: &PgPool, email: &str) -> Result<Option<LoginRecord>, AuthError> {
    let query = "SELECT id, password_hash, is_active FROM users WHERE email = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login record")?;

    Ok(row.map(|row| LoginRecord {
        id: row.get("id"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
    }))
}
