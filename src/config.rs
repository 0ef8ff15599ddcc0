//! Construction-time configuration for the authentication core.
//!
//! Every knob (TTLs, thresholds, scoring weights) is injected here instead of
//! being read from ambient globals, so tests and per-environment deployments
//! can tune behavior deterministically.

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_SESSION_IDLE_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SESSION_MAX_LIFETIME_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: i64 = 15 * 60;
const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: i64 = 10;
const DEFAULT_LOCKOUT_THRESHOLD: i64 = 5;
const DEFAULT_LOCKOUT_DURATION_SECONDS: i64 = 30 * 60;
const DEFAULT_HARD_LOCKOUT_MULTIPLIER: i64 = 3;
const DEFAULT_TWO_FACTOR_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_TWO_FACTOR_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_TRUST_THRESHOLD: i32 = 60;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 10 * 60;
const DEFAULT_ATTEMPT_RETENTION_SECONDS: i64 = 30 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    session_idle_seconds: i64,
    session_max_lifetime_seconds: i64,
    rate_limit_window_seconds: i64,
    rate_limit_max_attempts: i64,
    lockout_threshold: i64,
    lockout_duration_seconds: i64,
    hard_lockout_multiplier: i64,
    two_factor_ttl_seconds: i64,
    two_factor_max_attempts: i32,
    trust_threshold: i32,
    sweep_interval_seconds: u64,
    attempt_retention_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            session_idle_seconds: DEFAULT_SESSION_IDLE_SECONDS,
            session_max_lifetime_seconds: DEFAULT_SESSION_MAX_LIFETIME_SECONDS,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
            rate_limit_max_attempts: DEFAULT_RATE_LIMIT_MAX_ATTEMPTS,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_duration_seconds: DEFAULT_LOCKOUT_DURATION_SECONDS,
            hard_lockout_multiplier: DEFAULT_HARD_LOCKOUT_MULTIPLIER,
            two_factor_ttl_seconds: DEFAULT_TWO_FACTOR_TTL_SECONDS,
            two_factor_max_attempts: DEFAULT_TWO_FACTOR_MAX_ATTEMPTS,
            trust_threshold: DEFAULT_TRUST_THRESHOLD,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            attempt_retention_seconds: DEFAULT_ATTEMPT_RETENTION_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_idle_seconds(mut self, seconds: i64) -> Self {
        self.session_idle_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_max_lifetime_seconds(mut self, seconds: i64) -> Self {
        self.session_max_lifetime_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_window_seconds(mut self, seconds: i64) -> Self {
        self.rate_limit_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_rate_limit_max_attempts(mut self, attempts: i64) -> Self {
        self.rate_limit_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: i64) -> Self {
        self.lockout_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_lockout_duration_seconds(mut self, seconds: i64) -> Self {
        self.lockout_duration_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_two_factor_ttl_seconds(mut self, seconds: i64) -> Self {
        self.two_factor_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_two_factor_max_attempts(mut self, attempts: i32) -> Self {
        self.two_factor_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_trust_threshold(mut self, threshold: i32) -> Self {
        self.trust_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.sweep_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub const fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub const fn session_idle_seconds(&self) -> i64 {
        self.session_idle_seconds
    }

    #[must_use]
    pub const fn session_max_lifetime_seconds(&self) -> i64 {
        self.session_max_lifetime_seconds
    }

    #[must_use]
    pub const fn rate_limit_window_seconds(&self) -> i64 {
        self.rate_limit_window_seconds
    }

    #[must_use]
    pub const fn rate_limit_max_attempts(&self) -> i64 {
        self.rate_limit_max_attempts
    }

    #[must_use]
    pub const fn lockout_threshold(&self) -> i64 {
        self.lockout_threshold
    }

    #[must_use]
    pub const fn lockout_duration_seconds(&self) -> i64 {
        self.lockout_duration_seconds
    }

    /// Streaks at `threshold * multiplier` escalate to an admin-only lock.
    #[must_use]
    pub const fn hard_lockout_threshold(&self) -> i64 {
        self.lockout_threshold * self.hard_lockout_multiplier
    }

    #[must_use]
    pub const fn two_factor_ttl_seconds(&self) -> i64 {
        self.two_factor_ttl_seconds
    }

    #[must_use]
    pub const fn two_factor_max_attempts(&self) -> i32 {
        self.two_factor_max_attempts
    }

    #[must_use]
    pub const fn trust_threshold(&self) -> i32 {
        self.trust_threshold
    }

    #[must_use]
    pub const fn sweep_interval_seconds(&self) -> u64 {
        self.sweep_interval_seconds
    }

    #[must_use]
    pub const fn attempt_retention_seconds(&self) -> i64 {
        self.attempt_retention_seconds
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = AuthConfig::new();
        assert_eq!(config.access_ttl_seconds(), 24 * 60 * 60);
        assert_eq!(config.refresh_ttl_seconds(), 30 * 24 * 60 * 60);
        assert_eq!(config.rate_limit_window_seconds(), 15 * 60);
        assert_eq!(config.rate_limit_max_attempts(), 10);
        assert_eq!(config.lockout_threshold(), 5);
        assert_eq!(config.lockout_duration_seconds(), 30 * 60);
        assert_eq!(config.hard_lockout_threshold(), 15);
        assert_eq!(config.two_factor_max_attempts(), 5);
        assert_eq!(config.trust_threshold(), 60);
    }

    #[test]
    fn overrides_apply() {
        let config = AuthConfig::new()
            .with_access_ttl_seconds(60)
            .with_refresh_ttl_seconds(120)
            .with_rate_limit_window_seconds(30)
            .with_rate_limit_max_attempts(3)
            .with_lockout_threshold(2)
            .with_lockout_duration_seconds(10)
            .with_two_factor_ttl_seconds(5)
            .with_two_factor_max_attempts(1)
            .with_trust_threshold(90)
            .with_sweep_interval_seconds(1);

        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.refresh_ttl_seconds(), 120);
        assert_eq!(config.rate_limit_window_seconds(), 30);
        assert_eq!(config.rate_limit_max_attempts(), 3);
        assert_eq!(config.lockout_threshold(), 2);
        assert_eq!(config.hard_lockout_threshold(), 6);
        assert_eq!(config.two_factor_max_attempts(), 1);
        assert_eq!(config.trust_threshold(), 90);
        assert_eq!(config.sweep_interval_seconds(), 1);
    }
}
