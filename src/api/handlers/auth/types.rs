//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::device::DeviceInfo;
use crate::twofactor::ChallengeMethod;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device: DeviceInfo,
    /// Preferred challenge channel when step-up verification is required.
    pub method: Option<ChallengeMethod>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub requires_2fa: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub refresh_token: String,
    /// Also revoke every other session and refresh token for the account.
    #[serde(default)]
    pub all_sessions: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyRequest {
    pub session_id: Uuid,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TwoFactorVerifyResponse {
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_accepts_minimal_payload() {
        let request: LoginRequest = serde_json::from_str(
            r#"{"email":"match@amora.app","password":"hunter2-but-longer"}"#,
        )
        .expect("deserialize");
        assert_eq!(request.email, "match@amora.app");
        assert!(request.device.user_agent.is_none());
        assert!(request.method.is_none());
    }

    #[test]
    fn login_request_accepts_device_block() {
        let request: LoginRequest = serde_json::from_str(
            r#"{
                "email": "match@amora.app",
                "password": "hunter2-but-longer",
                "device": {"user_agent": "Amora/2.1 iPhone", "platform": "ios"},
                "method": "sms"
            }"#,
        )
        .expect("deserialize");
        assert_eq!(request.device.platform.as_deref(), Some("ios"));
        assert_eq!(request.method, Some(ChallengeMethod::Sms));
    }

    #[test]
    fn logout_defaults_to_single_session() {
        let request: LogoutRequest =
            serde_json::from_str(r#"{"refresh_token":"abc"}"#).expect("deserialize");
        assert!(!request.all_sessions);
    }

    #[test]
    fn login_response_round_trips() {
        let response = LoginResponse {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            session_id: Uuid::new_v4(),
            requires_2fa: true,
        };
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["requires_2fa"], true);
        let decoded: LoginResponse = serde_json::from_value(value).expect("deserialize");
        assert_eq!(decoded.session_id, response.session_id);
    }
}
