//! Error taxonomy for the authentication core.
//!
//! Every variant except `Internal` is an expected, caller-recoverable
//! condition and maps to a structured 4xx response with a stable `code`
//! field. Store failures and other surprises stay server-side: they are
//! logged with full context and surfaced as an opaque 500.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header is missing")]
    MissingToken,
    #[error("Token is malformed")]
    InvalidTokenFormat,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token type does not match its intended use")]
    TokenTypeMismatch,
    #[error("User not found or inactive")]
    UserNotFound,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Refresh token is revoked or expired")]
    RefreshTokenRevokedOrExpired,
    #[error("Too many attempts")]
    RateLimitExceeded { retry_after_seconds: u64 },
    #[error("Account is locked")]
    AccountLocked {
        retry_after_seconds: Option<u64>,
    },
    #[error("Two-factor verification required")]
    TwoFactorRequired,
    #[error("Invalid two-factor code")]
    TwoFactorInvalidCode,
    #[error("Two-factor attempts exhausted")]
    TwoFactorMaxAttemptsExceeded,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code included in every error response.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "MissingToken",
            Self::InvalidTokenFormat => "InvalidTokenFormat",
            Self::TokenExpired => "TokenExpired",
            Self::TokenTypeMismatch => "TokenTypeMismatch",
            Self::UserNotFound => "UserNotFound",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::RefreshTokenRevokedOrExpired => "RefreshTokenRevokedOrExpired",
            Self::RateLimitExceeded { .. } => "RateLimitExceeded",
            Self::AccountLocked { .. } => "AccountLocked",
            Self::TwoFactorRequired => "TwoFactorRequired",
            Self::TwoFactorInvalidCode => "TwoFactorInvalidCode",
            Self::TwoFactorMaxAttemptsExceeded => "TwoFactorMaxAttemptsExceeded",
            Self::Internal(_) => "InternalError",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken
            | Self::InvalidTokenFormat
            | Self::TokenExpired
            | Self::TokenTypeMismatch
            | Self::UserNotFound
            | Self::InvalidCredentials
            | Self::RefreshTokenRevokedOrExpired
            | Self::TwoFactorInvalidCode => StatusCode::UNAUTHORIZED,
            Self::TwoFactorRequired => StatusCode::FORBIDDEN,
            Self::AccountLocked { .. } => StatusCode::LOCKED,
            Self::RateLimitExceeded { .. } | Self::TwoFactorMaxAttemptsExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Seconds until a retry can reasonably succeed, when known.
    #[must_use]
    pub const fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::RateLimitExceeded {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            Self::AccountLocked {
                retry_after_seconds,
            } => *retry_after_seconds,
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Internal detail never leaks to the caller; the chain goes to the log.
        let message = match &self {
            Self::Internal(err) => {
                error!("internal auth error: {err:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let retry_after = self.retry_after_seconds();
        let body = ErrorBody {
            code: self.code().to_string(),
            message,
            retry_after_seconds: retry_after,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let Some(seconds) = retry_after
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AuthError::MissingToken.code(), "MissingToken");
        assert_eq!(
            AuthError::RefreshTokenRevokedOrExpired.code(),
            "RefreshTokenRevokedOrExpired"
        );
        assert_eq!(
            AuthError::RateLimitExceeded {
                retry_after_seconds: 60
            }
            .code(),
            "RateLimitExceeded"
        );
        assert_eq!(
            AuthError::TwoFactorMaxAttemptsExceeded.code(),
            "TwoFactorMaxAttemptsExceeded"
        );
    }

    #[test]
    fn statuses_stay_in_the_4xx_range_for_expected_errors() {
        let expected = [
            AuthError::MissingToken,
            AuthError::InvalidTokenFormat,
            AuthError::TokenExpired,
            AuthError::TokenTypeMismatch,
            AuthError::UserNotFound,
            AuthError::InvalidCredentials,
            AuthError::RefreshTokenRevokedOrExpired,
            AuthError::RateLimitExceeded {
                retry_after_seconds: 1,
            },
            AuthError::AccountLocked {
                retry_after_seconds: None,
            },
            AuthError::TwoFactorRequired,
            AuthError::TwoFactorInvalidCode,
            AuthError::TwoFactorMaxAttemptsExceeded,
        ];
        for err in expected {
            assert!(err.status().is_client_error(), "{} is not 4xx", err.code());
        }
        assert_eq!(
            AuthError::Internal(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn retry_after_only_set_when_known() {
        assert_eq!(
            AuthError::RateLimitExceeded {
                retry_after_seconds: 42
            }
            .retry_after_seconds(),
            Some(42)
        );
        assert_eq!(
            AuthError::AccountLocked {
                retry_after_seconds: Some(1800)
            }
            .retry_after_seconds(),
            Some(1800)
        );
        assert_eq!(AuthError::TwoFactorRequired.retry_after_seconds(), None);
    }

    #[test]
    fn rate_limited_response_carries_retry_after_header() {
        let response = AuthError::RateLimitExceeded {
            retry_after_seconds: 90,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("90")
        );
    }
}
