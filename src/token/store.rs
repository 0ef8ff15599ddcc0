//! Database access for refresh tokens and the user rows the token service
//! reads.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

/// The slice of the platform-owned user row the auth core needs.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
}

/// Ownership data recovered when a refresh token is consumed.
#[derive(Debug)]
pub(super) struct ConsumedToken {
    pub(super) user_id: Uuid,
    pub(super) session_id: Uuid,
}

pub(super) async fn insert_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
    token_hash: &[u8],
    expires_at: DateTime<Utc>,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens (user_id, session_id, token_hash, expires_at, issued_ip, user_agent)
        VALUES ($1, $2, $3, $4, $5::inet, $6)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(session_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(ip)
        .bind(user_agent)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

pub(super) async fn insert_refresh_token_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    session_id: Uuid,
    token_hash: &[u8],
    expires_at: DateTime<Utc>,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens (user_id, session_id, token_hash, expires_at, issued_ip, user_agent)
        VALUES ($1, $2, $3, $4, $5::inet, $6)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(session_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(ip)
        .bind(user_agent)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert rotated refresh token")?;
    Ok(())
}

/// Atomically consume a refresh token: mark it revoked only if it is still
/// valid. `None` means the token was missing, already revoked, or expired —
/// the caller must not issue a replacement.
pub(super) async fn consume_refresh_token(
    tx: &mut Transaction<'_, Postgres>,
    token_hash: &[u8],
) -> Result<Option<ConsumedToken>> {
    let query = r"
        UPDATE refresh_tokens
        SET is_revoked = TRUE
        WHERE token_hash = $1
          AND NOT is_revoked
          AND expires_at > NOW()
        RETURNING user_id, session_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume refresh token")?;
    Ok(row.map(|row| ConsumedToken {
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
    }))
}

/// Whether any row exists for this hash, valid or not. Used to tell a replay
/// of a consumed token apart from a token we never issued.
pub(super) async fn refresh_token_exists(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let query = "SELECT 1 FROM refresh_tokens WHERE token_hash = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check refresh token existence")?;
    Ok(row.is_some())
}

/// The rotated pair must land on a session that is still live.
pub(super) async fn session_is_live(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM sessions
        WHERE id = $1
          AND status IN ('pending_2fa', 'active')
          AND expires_at > NOW()
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
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check session liveness")?;
    Ok(row.is_some())
}

pub(super) async fn fetch_active_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email FROM users WHERE id = $1 AND is_active LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;
    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        email: row.get("email"),
    }))
}

pub(super) async fn fetch_active_user_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email FROM users WHERE id = $1 AND is_active LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to fetch user")?;
    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        email: row.get("email"),
    }))
}

pub(super) async fn touch_last_active(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET last_active = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update last_active")?;
    Ok(())
}

/// Monotonic single-token revocation; already-revoked rows are a no-op.
pub(super) async fn revoke_by_hash(pool: &PgPool, token_hash: &[u8]) -> Result<bool> {
    let query = r"
        UPDATE refresh_tokens
        SET is_revoked = TRUE
        WHERE token_hash = $1
          AND NOT is_revoked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke refresh token")?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET is_revoked = TRUE
        WHERE user_id = $1
          AND NOT is_revoked
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke user refresh tokens")?;
    Ok(result.rows_affected())
}

/// Sweep helper: drop rows that can never validate again. Deleting a row that
/// was already consumed is a safe no-op under concurrency.
pub async fn purge_stale(pool: &PgPool, grace_seconds: i64) -> Result<u64> {
    let query = r"
        DELETE FROM refresh_tokens
        WHERE expires_at < NOW() - ($1 * INTERVAL '1 second')
           OR (is_revoked AND created_at < NOW() - ($1 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(grace_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to purge stale refresh tokens")?;
    Ok(result.rows_affected())
}
