//! Access-token gate for protected endpoints.

use axum::http::HeaderMap;
use chrono::Utc;

use super::state::AuthState;
use super::utils::extract_bearer_token;
use crate::error::AuthError;
use crate::token::AccessIdentity;

/// Resolve the caller behind a `Bearer` access token and enforce session
/// state: the session must still be live, and a session that requires
/// step-up verification rejects every protected operation until its code is
/// verified. Touching the session slides its activity window.
///
/// # Errors
/// Fails `MissingToken`, any token verification error, `TokenExpired` when
/// the session is gone or terminal, or `TwoFactorRequired` while elevation
/// is pending.
pub(crate) async fn require_access(
    headers: &HeaderMap,
    state: &AuthState,
) -> Result<AccessIdentity, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::MissingToken)?;
    let identity = state.tokens().verify_access(&token).await?;

    let session = state
        .sessions()
        .fetch(identity.session_id)
        .await?
        .ok_or(AuthError::TokenExpired)?;

    if session.status.is_terminal() || session.expires_at <= Utc::now() {
        return Err(AuthError::TokenExpired);
    }
    if session.requires_2fa && !session.two_fa_verified {
        return Err(AuthError::TwoFactorRequired);
    }

    state.sessions().touch(session.id).await?;
    Ok(identity)
}
