//! Session lifecycle: creation, activity tracking, two-factor elevation, and
//! termination.
//!
//! A session is born `pending_2fa` when the device is untrusted, otherwise
//! `active`. The only upgrade path is `pending_2fa -> active` via a verified
//! two-factor code. `expired` and `revoked` are terminal; every UPDATE below
//! guards on the live statuses so a terminal session can never resurface.

pub mod device;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AuthConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Pending2fa,
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending2fa => "pending_2fa",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_2fa" => Some(Self::Pending2fa),
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Revoked)
    }
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: Option<Uuid>,
    pub status: SessionStatus,
    pub requires_2fa: bool,
    pub two_fa_verified: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Sliding expiry: idle window from `now`, capped at a hard ceiling from the
/// session's creation so activity cannot extend a session forever.
#[must_use]
pub fn slide_expiry(
    now: DateTime<Utc>,
    created_at: DateTime<Utc>,
    idle_seconds: i64,
    max_lifetime_seconds: i64,
) -> DateTime<Utc> {
    let idle = now + Duration::seconds(idle_seconds);
    let ceiling = created_at + Duration::seconds(max_lifetime_seconds);
    idle.min(ceiling)
}

pub struct SessionStore {
    pool: PgPool,
    config: Arc<AuthConfig>,
}

impl SessionStore {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AuthConfig>) -> Self {
        Self { pool, config }
    }

    /// Create a session for a fresh login. Untrusted devices start
    /// `pending_2fa`; trusted ones go straight to `active`.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn create(
        &self,
        user_id: Uuid,
        device_id: Option<Uuid>,
        requires_2fa: bool,
        ip: Option<&str>,
    ) -> Result<SessionRecord> {
        let now = Utc::now();
        let status = if requires_2fa {
            SessionStatus::Pending2fa
        } else {
            SessionStatus::Active
        };
        let expires_at = slide_expiry(
            now,
            now,
            self.config.session_idle_seconds(),
            self.config.session_max_lifetime_seconds(),
        );

        let query = r"
            INSERT INTO sessions (user_id, device_id, status, ip, requires_2fa, expires_at)
            VALUES ($1, $2, $3, $4::inet, $5, $6)
            RETURNING id, created_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(device_id)
            .bind(status.as_str())
            .bind(ip)
            .bind(requires_2fa)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;

        Ok(SessionRecord {
            id: row.get("id"),
            user_id,
            device_id,
            status,
            requires_2fa,
            two_fa_verified: false,
            created_at: row.get("created_at"),
            expires_at,
        })
    }

    /// # Errors
    /// Returns an error on store failure.
    pub async fn fetch(&self, session_id: Uuid) -> Result<Option<SessionRecord>> {
        let query = r"
            SELECT id, user_id, device_id, status, requires_2fa, two_fa_verified,
                   created_at, expires_at
            FROM sessions
            WHERE id = $1
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.get("status");
        let status = SessionStatus::parse(&status)
            .with_context(|| format!("unknown session status: {status}"))?;
        Ok(Some(SessionRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            device_id: row.get("device_id"),
            status,
            requires_2fa: row.get("requires_2fa"),
            two_fa_verified: row.get("two_fa_verified"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        }))
    }

    /// Record activity and slide the expiry window, honoring the ceiling.
    /// Terminal sessions are left untouched.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn touch(&self, session_id: Uuid) -> Result<()> {
        let query = r"
            UPDATE sessions
            SET last_activity = NOW(),
                expires_at = LEAST(
                    NOW() + ($2 * INTERVAL '1 second'),
                    created_at + ($3 * INTERVAL '1 second')
                )
            WHERE id = $1
              AND status IN ('pending_2fa', 'active')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .bind(self.config.session_idle_seconds())
            .bind(self.config.session_max_lifetime_seconds())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch session")?;
        Ok(())
    }

    /// `pending_2fa -> active` on a verified code. Returns false when the
    /// session was not awaiting verification (already active or terminal).
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn mark_two_factor_verified(&self, session_id: Uuid) -> Result<bool> {
        let query = r"
            UPDATE sessions
            SET status = 'active',
                two_fa_verified = TRUE,
                last_activity = NOW()
            WHERE id = $1
              AND status = 'pending_2fa'
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark session verified")?;
        Ok(result.rows_affected() > 0)
    }

    /// Terminate one session. Idempotent on terminal sessions.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn revoke(&self, session_id: Uuid, reason: &str) -> Result<bool> {
        let query = r"
            UPDATE sessions
            SET status = 'revoked',
                termination_reason = $2
            WHERE id = $1
              AND status IN ('pending_2fa', 'active')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(reason)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke session")?;
        Ok(result.rows_affected() > 0)
    }

    /// Terminate every live session for a user (logout-all, compromise).
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn revoke_all_for_user(&self, user_id: Uuid, reason: &str) -> Result<u64> {
        let query = r"
            UPDATE sessions
            SET status = 'revoked',
                termination_reason = $2
            WHERE user_id = $1
              AND status IN ('pending_2fa', 'active')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(reason)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke user sessions")?;
        Ok(result.rows_affected())
    }

    /// Sweep helper: close sessions whose window has lapsed.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn expire_overdue(&self) -> Result<u64> {
        let query = r"
            UPDATE sessions
            SET status = 'expired',
                termination_reason = 'inactivity'
            WHERE status IN ('pending_2fa', 'active')
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
            .context("failed to expire sessions")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            SessionStatus::Pending2fa,
            SessionStatus::Active,
            SessionStatus::Expired,
            SessionStatus::Revoked,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("zombie"), None);
    }

    #[test]
    fn only_end_states_are_terminal() {
        assert!(!SessionStatus::Pending2fa.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
        assert!(SessionStatus::Revoked.is_terminal());
    }

    #[test]
    fn expiry_slides_with_activity() {
        let created = Utc::now();
        let later = created + Duration::seconds(3600);
        let expiry = slide_expiry(later, created, 86_400, 2_592_000);
        assert_eq!(expiry, later + Duration::seconds(86_400));
    }

    #[test]
    fn expiry_is_capped_by_the_ceiling() {
        let created = Utc::now();
        // Close to the 30-day ceiling: the idle window would overshoot it.
        let later = created + Duration::seconds(2_592_000 - 60);
        let expiry = slide_expiry(later, created, 86_400, 2_592_000);
        assert_eq!(expiry, created + Duration::seconds(2_592_000));
    }

    #[test]
    fn fresh_session_expiry_uses_idle_window() {
        let now = Utc::now();
        let expiry = slide_expiry(now, now, 86_400, 2_592_000);
        assert_eq!(expiry, now + Duration::seconds(86_400));
    }
}
