//! Out-of-band delivery of two-factor codes.
//!
//! Delivery itself belongs to the platform's notification stack; this module
//! only defines the handoff. The webhook sender posts to that stack and the
//! log sender backs local development.

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};

use super::ChallengeMethod;

/// A freshly issued code on its way to the user. The plaintext code exists
/// only here and in the delivery channel; the store keeps a hash.
#[derive(Clone, Debug, Serialize)]
pub struct ChallengeCode {
    pub email: String,
    pub method: ChallengeMethod,
    pub code: String,
    pub expires_in_seconds: i64,
}

/// Delivery abstraction for issued codes.
pub trait CodeSender: Send + Sync {
    /// Hand the code to the delivery channel or return an error.
    fn send(&self, challenge: &ChallengeCode) -> Result<()>;
}

/// Local dev sender that logs instead of delivering.
#[derive(Clone, Debug)]
pub struct LogCodeSender;

impl CodeSender for LogCodeSender {
    fn send(&self, challenge: &ChallengeCode) -> Result<()> {
        info!(
            email = %challenge.email,
            method = %challenge.method.as_str(),
            code = %challenge.code,
            "two-factor code delivery stub"
        );
        Ok(())
    }
}

/// Posts the challenge to the platform notification gateway, which fans out
/// to SMS or email. Delivery runs detached so a slow gateway cannot hold up
/// the login response; failures are logged and the user can request a new
/// code.
#[derive(Clone, Debug)]
pub struct WebhookCodeSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookCodeSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

impl CodeSender for WebhookCodeSender {
    fn send(&self, challenge: &ChallengeCode) -> Result<()> {
        let client = self.client.clone();
        let url = self.url.clone();
        let payload = challenge.clone();
        tokio::spawn(async move {
            let result = client.post(&url).json(&payload).send().await;
            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    error!(
                        status = %response.status(),
                        "two-factor webhook rejected the challenge"
                    );
                }
                Err(err) => {
                    error!("two-factor webhook delivery failed: {err}");
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sender_always_succeeds() {
        let sender = LogCodeSender;
        let challenge = ChallengeCode {
            email: "match@amora.app".to_string(),
            method: ChallengeMethod::Email,
            code: "123456".to_string(),
            expires_in_seconds: 600,
        };
        assert!(sender.send(&challenge).is_ok());
    }

    #[test]
    fn challenge_serializes_for_the_gateway() {
        let challenge = ChallengeCode {
            email: "match@amora.app".to_string(),
            method: ChallengeMethod::Sms,
            code: "004242".to_string(),
            expires_in_seconds: 600,
        };
        let value = serde_json::to_value(&challenge).expect("serialize");
        assert_eq!(value["method"], "sms");
        assert_eq!(value["code"], "004242");
    }
}
