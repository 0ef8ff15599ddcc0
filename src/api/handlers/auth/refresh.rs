//! Refresh-token rotation and logout endpoints.

use axum::{Json, extract::Extension, http::HeaderMap, http::StatusCode};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use super::state::AuthState;
use super::types::{LogoutRequest, RefreshRequest, RefreshResponse};
use super::utils::{extract_client_ip, user_agent};
use crate::error::AuthError;
use crate::events::{self, SecurityEvent, Severity, kinds};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Rotated token pair", body = RefreshResponse),
        (status = 401, description = "Refresh token revoked or expired", body = crate::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let ip = extract_client_ip(&headers);
    let user_agent = user_agent(&headers);

    let pair = match state
        .tokens()
        .rotate(&request.refresh_token, ip.as_deref(), user_agent.as_deref())
        .await
    {
        Ok(pair) => pair,
        Err(err) => {
            events::record(
                &pool,
                SecurityEvent::new(kinds::TOKEN_REFRESH_FAILED, Severity::Warning)
                    .with_context(json!({ "ip": ip, "code": err.code() })),
            )
            .await;
            return Err(err);
        }
    };

    // Rotation counts as activity on the session behind the chain.
    state.sessions().touch(pair.session_id).await?;

    events::record(
        &pool,
        SecurityEvent::new(kinds::TOKEN_REFRESHED, Severity::Info)
            .with_context(json!({ "session_id": pair.session_id, "ip": ip })),
    )
    .await;

    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Tokens revoked"),
        (status = 401, description = "Malformed refresh token", body = crate::error::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<LogoutRequest>,
) -> Result<StatusCode, AuthError> {
    let ip = extract_client_ip(&headers);

    // Lenient about expiry: a client must always be able to log out. The
    // signature still has to verify, which also gives us the session to close.
    let claims = state.tokens().revoke(&request.refresh_token).await?;

    if request.all_sessions {
        state.tokens().revoke_all(claims.sub).await?;
        state
            .sessions()
            .revoke_all_for_user(claims.sub, "logout")
            .await?;
    } else {
        state.sessions().revoke(claims.sid, "logout").await?;
    }

    events::record(
        &pool,
        SecurityEvent::new(kinds::LOGOUT, Severity::Info)
            .with_user(claims.sub)
            .with_context(json!({
                "session_id": claims.sid,
                "ip": ip,
                "all_sessions": request.all_sessions
            })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
