//! Escalation of repeated login failures into account lockouts.
//!
//! The streak is the run of failed `login_attempts` since the account's last
//! success; a success implicitly resets it by breaking the run. Reaching the
//! threshold creates a time-boxed lock, and a streak three times the
//! threshold escalates to a permanent lock that only an admin can lift.
//! Re-triggering an already-active lock of the same type extends it instead
//! of stacking rows. The lock check runs before password comparison so a
//! locked account leaks nothing about credential correctness.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockoutKind {
    Temporary,
    Permanent,
}

impl LockoutKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Temporary => "temporary",
            Self::Permanent => "permanent",
        }
    }
}

/// Severity classification for a failure streak.
#[must_use]
pub fn classify(streak: i64, threshold: i64, hard_threshold: i64) -> Option<LockoutKind> {
    if streak >= hard_threshold {
        Some(LockoutKind::Permanent)
    } else if streak >= threshold {
        Some(LockoutKind::Temporary)
    } else {
        None
    }
}

pub struct LockoutPolicy {
    pool: PgPool,
    config: Arc<AuthConfig>,
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AuthConfig>) -> Self {
        Self { pool, config }
    }

    /// First per-account gate in the login path.
    ///
    /// # Errors
    /// Fails `AccountLocked` while a lock is active; `retry_after_seconds`
    /// is absent for admin-only locks.
    pub async fn ensure_not_locked(&self, user_id: Uuid) -> Result<(), AuthError> {
        let query = r"
            SELECT expires_at
            FROM account_lockouts
            WHERE user_id = $1
              AND is_active
              AND (expires_at IS NULL OR expires_at > NOW())
            ORDER BY locked_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check lockout status")?;

        if let Some(row) = row {
            let expires_at: Option<DateTime<Utc>> = row.get("expires_at");
            let retry_after_seconds = expires_at
                .map(|at| (at - Utc::now()).num_seconds())
                .and_then(|seconds| u64::try_from(seconds.max(1)).ok());
            return Err(AuthError::AccountLocked {
                retry_after_seconds,
            });
        }
        Ok(())
    }

    /// Evaluate the failure streak after a failed credential check and
    /// create or extend a lockout when a threshold is crossed.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn register_failure(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<Option<LockoutKind>> {
        let streak = self.consecutive_failures(email).await?;
        let Some(kind) = classify(
            streak,
            self.config.lockout_threshold(),
            self.config.hard_lockout_threshold(),
        ) else {
            return Ok(None);
        };

        let reason = format!("{streak} consecutive failed login attempts");
        self.apply(user_id, kind, &reason).await?;
        Ok(Some(kind))
    }

    /// Failed attempts since the last successful login for this account.
    async fn consecutive_failures(&self, email: &str) -> Result<i64> {
        let query = r"
            SELECT COUNT(*) AS streak
            FROM login_attempts
            WHERE email = $1
              AND NOT successful
              AND attempted_at > COALESCE(
                  (SELECT MAX(attempted_at) FROM login_attempts WHERE email = $1 AND successful),
                  '-infinity'::timestamptz
              )
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count failure streak")?;
        Ok(row.get("streak"))
    }

    /// Extend the active lock of the same type, or open a new one.
    async fn apply(&self, user_id: Uuid, kind: LockoutKind, reason: &str) -> Result<()> {
        let expires_clause = match kind {
            LockoutKind::Temporary => Some(self.config.lockout_duration_seconds()),
            LockoutKind::Permanent => None,
        };

        let query = r"
            UPDATE account_lockouts
            SET locked_at = NOW(),
                reason = $3,
                expires_at = CASE
                    WHEN $4::bigint IS NULL THEN NULL
                    ELSE NOW() + ($4 * INTERVAL '1 second')
                END
            WHERE user_id = $1
              AND lockout_type = $2
              AND is_active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let updated = sqlx::query(query)
            .bind(user_id)
            .bind(kind.as_str())
            .bind(reason)
            .bind(expires_clause)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to extend lockout")?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let query = r"
            INSERT INTO account_lockouts (user_id, lockout_type, reason, expires_at)
            VALUES (
                $1, $2, $3,
                CASE
                    WHEN $4::bigint IS NULL THEN NULL
                    ELSE NOW() + ($4 * INTERVAL '1 second')
                END
            )
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(kind.as_str())
            .bind(reason)
            .bind(expires_clause)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to create lockout")?;
        Ok(())
    }

    /// Admin unlock. Closes every active lock for the user.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn unlock(&self, user_id: Uuid, unlocked_by: &str) -> Result<bool> {
        let query = r"
            UPDATE account_lockouts
            SET is_active = FALSE,
                unlocked_by = $2,
                unlocked_at = NOW()
            WHERE user_id = $1
              AND is_active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(unlocked_by)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to unlock account")?;
        Ok(result.rows_affected() > 0)
    }

    /// Sweep helper: close time-boxed locks whose window has passed.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn release_expired(&self) -> Result<u64> {
        let query = r"
            UPDATE account_lockouts
            SET is_active = FALSE,
                unlocked_by = 'expiry',
                unlocked_at = NOW()
            WHERE is_active
              AND expires_at IS NOT NULL
              AND expires_at <= NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to release expired lockouts")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_no_lockout() {
        assert_eq!(classify(0, 5, 15), None);
        assert_eq!(classify(4, 5, 15), None);
    }

    #[test]
    fn threshold_triggers_temporary() {
        assert_eq!(classify(5, 5, 15), Some(LockoutKind::Temporary));
        assert_eq!(classify(14, 5, 15), Some(LockoutKind::Temporary));
    }

    #[test]
    fn hard_threshold_escalates_to_permanent() {
        assert_eq!(classify(15, 5, 15), Some(LockoutKind::Permanent));
        assert_eq!(classify(40, 5, 15), Some(LockoutKind::Permanent));
    }

    #[test]
    fn kind_strings_match_schema_constraint() {
        assert_eq!(LockoutKind::Temporary.as_str(), "temporary");
        assert_eq!(LockoutKind::Permanent.as_str(), "permanent");
    }
}
