//! Two-factor verification endpoint: elevates a `pending_2fa` session.

use anyhow::Context;
use axum::{Json, extract::Extension, http::HeaderMap};
use serde_json::json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthState;
use super::types::{TwoFactorVerifyRequest, TwoFactorVerifyResponse};
use super::utils::extract_client_ip;
use crate::error::AuthError;
use crate::events::{self, SecurityEvent, Severity, kinds};
use crate::token::UserRecord;

#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 200, description = "Session elevated; fresh access token", body = TwoFactorVerifyResponse),
        (status = 401, description = "Invalid or expired code", body = crate::error::ErrorBody),
        (status = 429, description = "Challenge attempts exhausted", body = crate::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<TwoFactorVerifyRequest>,
) -> Result<Json<TwoFactorVerifyResponse>, AuthError> {
    let ip = extract_client_ip(&headers);

    // Unknown sessions get the same answer as a bad code; session ids must
    // not be probeable.
    let session = state
        .sessions()
        .fetch(request.session_id)
        .await?
        .ok_or(AuthError::TwoFactorInvalidCode)?;
    if session.status.is_terminal() {
        return Err(AuthError::TokenExpired);
    }

    if let Err(err) = state
        .two_factor()
        .verify(session.id, session.user_id, &request.code)
        .await
    {
        let exhausted = matches!(err, AuthError::TwoFactorMaxAttemptsExceeded);
        if matches!(
            err,
            AuthError::TwoFactorInvalidCode | AuthError::TwoFactorMaxAttemptsExceeded
        ) && let Some(device_id) = session.device_id
        {
            state.devices().record_two_factor(device_id, false).await?;
        }

        if exhausted {
            // pending_2fa -> revoked: the challenge channel is spent and the
            // session dies with it. A new login issues a fresh code.
            state
                .sessions()
                .revoke(session.id, "two_factor_exhausted")
                .await?;
            events::record(
                &pool,
                SecurityEvent::new(kinds::TWO_FACTOR_EXHAUSTED, Severity::Critical)
                    .with_user(session.user_id)
                    .with_context(json!({ "session_id": session.id, "ip": ip })),
            )
            .await;
        } else {
            events::record(
                &pool,
                SecurityEvent::new(kinds::TWO_FACTOR_FAILED, Severity::Warning)
                    .with_user(session.user_id)
                    .with_context(json!({ "session_id": session.id, "ip": ip, "code": err.code() })),
            )
            .await;
        }
        return Err(err);
    }

    state.sessions().mark_two_factor_verified(session.id).await?;
    if let Some(device_id) = session.device_id {
        state.devices().record_two_factor(device_id, true).await?;
    }

    let email = fetch_user_email(&pool, session.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    let user = UserRecord {
        id: session.user_id,
        email,
    };
    let access_token = state.tokens().mint_access(&user, session.id)?;

    events::record(
        &pool,
        SecurityEvent::new(kinds::TWO_FACTOR_VERIFIED, Severity::Info)
            .with_user(session.user_id)
            .with_context(json!({ "session_id": session.id, "ip": ip })),
    )
    .await;

    Ok(Json(TwoFactorVerifyResponse { access_token }))
}

async fn fetch_user_email(pool: &PgPool, user_id: Uuid) -> Result<Option<String>, AuthError> {
    let query = "SELECT email FROM users WHERE id = $1 AND is_active LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user email")?;
    Ok(row.map(|row| row.get("email")))
}
