//! Database-backed throttling of authentication attempts.
//!
//! Attempts are counted per source IP and per account email over a rolling
//! window, each with its own cap. The counters are the append-only
//! `login_attempts` rows themselves, so concurrent requests cannot
//! under-count and the limits hold across every server process sharing the
//! store. The check runs before any credential work so abuse stays cheap to
//! reject.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;

use crate::config::AuthConfig;
use crate::error::AuthError;

pub struct LoginRateLimiter {
    pool: PgPool,
    config: Arc<AuthConfig>,
}

impl LoginRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AuthConfig>) -> Self {
        Self { pool, config }
    }

    /// Reject when either the IP or the email has exhausted its window.
    ///
    /// # Errors
    /// Fails `RateLimitExceeded` with a retry-after hint when a cap is hit;
    /// store failures surface as `Internal`.
    pub async fn check(&self, email: &str, ip: Option<&str>) -> Result<(), AuthError> {
        let window = self.config.rate_limit_window_seconds();
        let cap = self.config.rate_limit_max_attempts();

        if let Some(ip) = ip {
            let usage = self.window_usage_for_ip(ip, window).await?;
            if usage.attempts >= cap {
                return Err(AuthError::RateLimitExceeded {
                    retry_after_seconds: usage.retry_after_seconds(window),
                });
            }
        }

        let usage = self.window_usage_for_email(email, window).await?;
        if usage.attempts >= cap {
            return Err(AuthError::RateLimitExceeded {
                retry_after_seconds: usage.retry_after_seconds(window),
            });
        }

        Ok(())
    }

    /// Append one attempt row. Both the limiter windows and the lockout
    /// streak are derived from these rows.
    ///
    /// # Errors
    /// Returns `Internal` on store failure.
    pub async fn record_attempt(
        &self,
        email: &str,
        ip: Option<&str>,
        successful: bool,
    ) -> Result<(), AuthError> {
        let query = r"
            INSERT INTO login_attempts (email, ip, successful)
            VALUES ($1, $2::inet, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(ip)
            .bind(successful)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login attempt")?;
        Ok(())
    }

    async fn window_usage_for_ip(&self, ip: &str, window_seconds: i64) -> Result<WindowUsage> {
        let query = r"
            SELECT COUNT(*) AS attempts, MIN(attempted_at) AS earliest
            FROM login_attempts
            WHERE ip = $1::inet
              AND attempted_at > NOW() - ($2 * INTERVAL '1 second')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(ip)
            .bind(window_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count attempts per ip")?;
        Ok(WindowUsage {
            attempts: row.get("attempts"),
            earliest: row.get("earliest"),
        })
    }

    async fn window_usage_for_email(
        &self,
        email: &str,
        window_seconds: i64,
    ) -> Result<WindowUsage> {
        let query = r"
            SELECT COUNT(*) AS attempts, MIN(attempted_at) AS earliest
            FROM login_attempts
            WHERE email = $1
              AND attempted_at > NOW() - ($2 * INTERVAL '1 second')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(window_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count attempts per email")?;
        Ok(WindowUsage {
            attempts: row.get("attempts"),
            earliest: row.get("earliest"),
        })
    }
}

struct WindowUsage {
    attempts: i64,
    earliest: Option<DateTime<Utc>>,
}

impl WindowUsage {
    /// Seconds until the earliest counted attempt leaves the window.
    fn retry_after_seconds(&self, window_seconds: i64) -> u64 {
        let age = self
            .earliest
            .map_or(0, |earliest| (Utc::now() - earliest).num_seconds());
        retry_after(window_seconds, age)
    }
}

/// Remaining wait given the window length and the age of the earliest
/// attempt inside it; never reports zero for an active limit.
#[must_use]
fn retry_after(window_seconds: i64, earliest_age_seconds: i64) -> u64 {
    let remaining = window_seconds - earliest_age_seconds;
    u64::try_from(remaining.clamp(1, window_seconds)).unwrap_or(1)
}

/// Sweep helper: drop attempts older than the retention horizon. The lockout
/// streak never reaches that far back, so pruning cannot change decisions.
///
/// # Errors
/// Returns an error on store failure.
pub async fn prune_attempts(pool: &PgPool, retention_seconds: i64) -> Result<u64> {
    let query = r"
        DELETE FROM login_attempts
        WHERE attempted_at < NOW() - ($1 * INTERVAL '1 second')
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(retention_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to prune login attempts")?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn retry_after_counts_down_with_age() {
        assert_eq!(retry_after(900, 0), 900);
        assert_eq!(retry_after(900, 600), 300);
    }

    #[test]
    fn retry_after_never_reports_zero() {
        assert_eq!(retry_after(900, 900), 1);
        assert_eq!(retry_after(900, 2000), 1);
    }

    #[test]
    fn window_usage_maps_earliest_to_wait() {
        let usage = WindowUsage {
            attempts: 10,
            earliest: Some(Utc::now() - Duration::seconds(300)),
        };
        let wait = usage.retry_after_seconds(900);
        // Allow a second of slack for the Utc::now() call above.
        assert!((599..=600).contains(&wait), "unexpected wait {wait}");
    }

    #[test]
    fn empty_window_defaults_to_full_wait() {
        let usage = WindowUsage {
            attempts: 0,
            earliest: None,
        };
        assert_eq!(usage.retry_after_seconds(900), 900);
    }
}
