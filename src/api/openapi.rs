//! OpenAPI document for the auth API.

use utoipa::OpenApi;

use crate::api::handlers::{auth, health, me};
use crate::error::ErrorBody;
use crate::session::device::DeviceInfo;
use crate::twofactor::ChallengeMethod;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::refresh::refresh,
        auth::refresh::logout,
        auth::two_factor::verify,
        me::me,
    ),
    components(schemas(
        health::Health,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        auth::types::RefreshRequest,
        auth::types::RefreshResponse,
        auth::types::LogoutRequest,
        auth::types::TwoFactorVerifyRequest,
        auth::types::TwoFactorVerifyResponse,
        me::MeResponse,
        DeviceInfo,
        ChallengeMethod,
        ErrorBody,
    )),
    tags(
        (name = "auth", description = "Login, token rotation, and two-factor elevation"),
        (name = "me", description = "Authenticated account endpoints"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "amora-auth",
        description = "Authentication and session security for the Amora dating platform"
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_auth_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/2fa/verify",
            "/v1/me",
        ] {
            assert!(
                paths.iter().any(|path| path.as_str() == expected),
                "missing path {expected}"
            );
        }
    }
}
