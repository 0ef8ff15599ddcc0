use secrecy::SecretString;

/// Secrets and cross-cutting settings resolved once at startup.
#[derive(Clone)]
pub struct GlobalArgs {
    pub jwt_secret: SecretString,
    pub app_base_url: String,
    pub two_factor_webhook_url: Option<String>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(jwt_secret: SecretString, app_base_url: String) -> Self {
        Self {
            jwt_secret,
            app_base_url,
            two_factor_webhook_url: None,
        }
    }

    #[must_use]
    pub fn with_two_factor_webhook_url(mut self, url: Option<String>) -> Self {
        self.two_factor_webhook_url = url;
        self
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("jwt_secret", &"***")
            .field("app_base_url", &self.app_base_url)
            .field("two_factor_webhook_url", &self.two_factor_webhook_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn holds_values_and_defaults() {
        let args = GlobalArgs::new(
            SecretString::from("signing-secret"),
            "https://app.amora.app".to_string(),
        );
        assert_eq!(args.jwt_secret.expose_secret(), "signing-secret");
        assert_eq!(args.app_base_url, "https://app.amora.app");
        assert!(args.two_factor_webhook_url.is_none());
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let args = GlobalArgs::new(
            SecretString::from("signing-secret"),
            "https://app.amora.app".to_string(),
        )
        .with_two_factor_webhook_url(Some("https://notify.amora.app/2fa".to_string()));
        let debug = format!("{args:?}");
        assert!(!debug.contains("signing-secret"));
        assert!(debug.contains("***"));
        assert!(debug.contains("notify.amora.app"));
    }
}
