//! Append-only security event log.
//!
//! Every auth branch, success or failure, records an event here. The contract
//! is fire-and-forget: a failure to write the audit row must never abort the
//! primary operation, so `record` swallows store errors after logging them.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{Instrument, warn};
use uuid::Uuid;

/// Event type names used across the auth core.
pub mod kinds {
    pub const LOGIN_SUCCESS: &str = "login_success";
    pub const LOGIN_FAILED: &str = "login_failed";
    pub const LOGIN_RATE_LIMITED: &str = "login_rate_limited";
    pub const ACCOUNT_LOCKED: &str = "account_locked";
    pub const ACCOUNT_UNLOCKED: &str = "account_unlocked";
    pub const DEVICE_REGISTERED: &str = "device_registered";
    pub const SESSION_REVOKED: &str = "session_revoked";
    pub const TOKEN_REFRESHED: &str = "token_refreshed";
    pub const TOKEN_REFRESH_FAILED: &str = "token_refresh_failed";
    pub const REFRESH_REUSE_DETECTED: &str = "refresh_reuse_detected";
    pub const LOGOUT: &str = "logout";
    pub const TWO_FACTOR_ISSUED: &str = "two_factor_issued";
    pub const TWO_FACTOR_VERIFIED: &str = "two_factor_verified";
    pub const TWO_FACTOR_FAILED: &str = "two_factor_failed";
    pub const TWO_FACTOR_EXHAUSTED: &str = "two_factor_exhausted";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug)]
pub struct SecurityEvent<'a> {
    pub event_type: &'a str,
    pub severity: Severity,
    pub user_id: Option<Uuid>,
    pub context: Value,
}

impl<'a> SecurityEvent<'a> {
    #[must_use]
    pub fn new(event_type: &'a str, severity: Severity) -> Self {
        Self {
            event_type,
            severity,
            user_id: None,
            context: Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Append an event. Never fails from the caller's perspective.
pub async fn record(pool: &PgPool, event: SecurityEvent<'_>) {
    if let Err(err) = insert_event(pool, &event).await {
        warn!(
            event_type = event.event_type,
            "failed to record security event: {err:#}"
        );
    }
}

async fn insert_event(pool: &PgPool, event: &SecurityEvent<'_>) -> Result<()> {
    let query = r"
        INSERT INTO security_events (user_id, event_type, severity, context)
        VALUES ($1, $2, $3, $4::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(event.user_id)
        .bind(event.event_type)
        .bind(event.severity.as_str())
        .bind(event.context.to_string())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert security event")?;
    Ok(())
}

/// Mark an event resolved. Returns false when the event was missing or
/// already resolved.
///
/// # Errors
/// Returns an error if the update fails.
pub async fn resolve(pool: &PgPool, event_id: Uuid, resolved_by: &str) -> Result<bool> {
    let query = r"
        UPDATE security_events
        SET is_resolved = TRUE,
            resolved_by = $2
        WHERE id = $1
          AND NOT is_resolved
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(event_id)
        .bind(resolved_by)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to resolve security event")?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_strings_match_schema_constraint() {
        assert_eq!(Severity::Info.as_str(), "info");
        assert_eq!(Severity::Warning.as_str(), "warning");
        assert_eq!(Severity::Critical.as_str(), "critical");
    }

    #[test]
    fn builder_sets_fields() {
        let user_id = Uuid::new_v4();
        let event = SecurityEvent::new(kinds::LOGIN_FAILED, Severity::Warning)
            .with_user(user_id)
            .with_context(json!({"ip": "203.0.113.9"}));
        assert_eq!(event.event_type, "login_failed");
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.context["ip"], "203.0.113.9");
    }

    #[test]
    fn default_context_is_empty_object() {
        let event = SecurityEvent::new(kinds::LOGOUT, Severity::Info);
        assert!(event.user_id.is_none());
        assert_eq!(event.context, json!({}));
    }
}
