//! Shared auth state wired once at server startup.

use secrecy::SecretString;
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::guard::{lockout::LockoutPolicy, rate_limit::LoginRateLimiter};
use crate::session::{SessionStore, device::DeviceTrustEngine};
use crate::token::TokenService;
use crate::twofactor::{TwoFactorService, delivery::CodeSender};

/// Every component the request handlers need, built from one pool, one
/// config, and one signing secret.
pub struct AuthState {
    config: Arc<AuthConfig>,
    tokens: TokenService,
    sessions: SessionStore,
    devices: DeviceTrustEngine,
    limiter: LoginRateLimiter,
    lockouts: LockoutPolicy,
    two_factor: TwoFactorService,
}

impl AuthState {
    #[must_use]
    pub fn new(
        pool: PgPool,
        config: Arc<AuthConfig>,
        jwt_secret: &SecretString,
        sender: Arc<dyn CodeSender>,
    ) -> Self {
        Self {
            tokens: TokenService::new(pool.clone(), config.clone(), jwt_secret),
            sessions: SessionStore::new(pool.clone(), config.clone()),
            devices: DeviceTrustEngine::new(pool.clone(), config.clone()),
            limiter: LoginRateLimiter::new(pool.clone(), config.clone()),
            lockouts: LockoutPolicy::new(pool.clone(), config.clone()),
            two_factor: TwoFactorService::new(pool, config.clone(), sender),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceTrustEngine {
        &self.devices
    }

    #[must_use]
    pub fn limiter(&self) -> &LoginRateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn lockouts(&self) -> &LockoutPolicy {
        &self.lockouts
    }

    #[must_use]
    pub fn two_factor(&self) -> &TwoFactorService {
        &self.two_factor
    }
}
