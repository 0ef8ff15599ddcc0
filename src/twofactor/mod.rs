//! Two-factor challenges: issuing, storing (hashed), and verifying
//! short-lived out-of-band codes.
//!
//! A session has at most one outstanding challenge; issuing a new code
//! consumes its predecessors. Codes are compared in constant time against
//! the stored hash, attempts are capped per challenge, and a code that
//! matches but has outlived its window is still rejected.

pub mod delivery;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{Instrument, error};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use delivery::{ChallengeCode, CodeSender};

const CODE_DIGITS: u32 = 6;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeMethod {
    Email,
    Sms,
}

impl ChallengeMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

pub struct TwoFactorService {
    pool: PgPool,
    config: Arc<AuthConfig>,
    sender: Arc<dyn CodeSender>,
}

impl TwoFactorService {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AuthConfig>, sender: Arc<dyn CodeSender>) -> Self {
        Self {
            pool,
            config,
            sender,
        }
    }

    /// Issue a fresh code for a session, consuming any outstanding challenge
    /// first so exactly one code is ever valid. Only the hash is stored; the
    /// plaintext goes straight to the delivery channel.
    ///
    /// # Errors
    /// Returns `Internal` on store failure. Delivery failures are logged and
    /// do not fail the operation; the user can request a new code.
    pub async fn issue(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        email: &str,
        method: ChallengeMethod,
    ) -> Result<(), AuthError> {
        let code = generate_code();
        let code_hash = hash_code(&code);
        let ttl = self.config.two_factor_ttl_seconds();
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl);

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin challenge transaction")?;

        let query = r"
            UPDATE two_factor_challenges
            SET consumed_at = NOW()
            WHERE session_id = $1
              AND consumed_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to consume outstanding challenges")?;

        let query = r"
            INSERT INTO two_factor_challenges
                (user_id, session_id, method, code_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
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
            .bind(method.as_str())
            .bind(&code_hash)
            .bind(expires_at)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert challenge")?;

        tx.commit()
            .await
            .context("failed to commit challenge transaction")?;

        let challenge = ChallengeCode {
            email: email.to_string(),
            method,
            code,
            expires_in_seconds: ttl,
        };
        if let Err(err) = self.sender.send(&challenge) {
            error!("two-factor code delivery failed: {err:#}");
        }

        Ok(())
    }

    /// Verify a submitted code against the session's outstanding challenge.
    ///
    /// # Errors
    /// Fails `TwoFactorInvalidCode` on mismatch or no outstanding challenge,
    /// `TwoFactorMaxAttemptsExceeded` once tries are exhausted (until a new
    /// code is issued), and `TokenExpired` when the window has elapsed even
    /// for a matching code.
    pub async fn verify(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        code: &str,
    ) -> Result<(), AuthError> {
        let Some(challenge) = self.outstanding(session_id, user_id).await? else {
            return Err(AuthError::TwoFactorInvalidCode);
        };

        // Expiry wins over everything, including a correct code.
        if challenge.expires_at <= Utc::now() {
            return Err(AuthError::TokenExpired);
        }

        if challenge.attempts >= self.config.two_factor_max_attempts() {
            return Err(AuthError::TwoFactorMaxAttemptsExceeded);
        }

        if !codes_match(code, &challenge.code_hash) {
            let attempts = self.register_miss(challenge.id).await?;
            if attempts >= self.config.two_factor_max_attempts() {
                return Err(AuthError::TwoFactorMaxAttemptsExceeded);
            }
            return Err(AuthError::TwoFactorInvalidCode);
        }

        // Conditional consume so a raced duplicate submit cannot succeed twice.
        let query = r"
            UPDATE two_factor_challenges
            SET consumed_at = NOW(),
                successful = TRUE
            WHERE id = $1
              AND consumed_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(challenge.id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume challenge")?;

        if result.rows_affected() == 0 {
            return Err(AuthError::TwoFactorInvalidCode);
        }
        Ok(())
    }

    async fn outstanding(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<OutstandingChallenge>, AuthError> {
        let query = r"
            SELECT id, code_hash, attempts, expires_at
            FROM two_factor_challenges
            WHERE session_id = $1
              AND user_id = $2
              AND consumed_at IS NULL
            ORDER BY created_at DESC
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
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to fetch outstanding challenge")?;

        Ok(row.map(|row| OutstandingChallenge {
            id: row.get("id"),
            code_hash: row.get("code_hash"),
            attempts: row.get("attempts"),
            expires_at: row.get("expires_at"),
        }))
    }

    /// Count a failed try; the counter rides on the challenge row so the
    /// increment is atomic under concurrent submissions.
    async fn register_miss(&self, challenge_id: Uuid) -> Result<i32, AuthError> {
        let query = r"
            UPDATE two_factor_challenges
            SET attempts = attempts + 1
            WHERE id = $1
            RETURNING attempts
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(challenge_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count failed attempt")?;
        Ok(row.get("attempts"))
    }
}

struct OutstandingChallenge {
    id: Uuid,
    code_hash: Vec<u8>,
    attempts: i32,
    expires_at: DateTime<Utc>,
}

/// Fixed-width numeric code from the OS RNG.
#[must_use]
pub fn generate_code() -> String {
    let bound = 10u32.pow(CODE_DIGITS);
    let value = OsRng.gen_range(0..bound);
    format!("{value:0width$}", width = CODE_DIGITS as usize)
}

/// SHA-256 of the code; only this ever reaches the database.
#[must_use]
pub fn hash_code(code: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.finalize().to_vec()
}

/// Constant-time comparison of a submitted code against the stored hash.
#[must_use]
pub fn codes_match(candidate: &str, stored_hash: &[u8]) -> bool {
    hash_code(candidate).ct_eq(stored_hash).into()
}

/// Sweep helper: drop consumed or long-expired challenges.
///
/// # Errors
/// Returns an error on store failure.
pub async fn purge_stale(pool: &PgPool, grace_seconds: i64) -> Result<u64> {
    let query = r"
        DELETE FROM two_factor_challenges
        WHERE consumed_at < NOW() - ($1 * INTERVAL '1 second')
           OR expires_at < NOW() - ($1 * INTERVAL '1 second')
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
        .context("failed to purge stale challenges")?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_hash_is_stable() {
        assert_eq!(hash_code("123456"), hash_code("123456"));
        assert_ne!(hash_code("123456"), hash_code("654321"));
    }

    #[test]
    fn matching_code_verifies_against_hash() {
        let hash = hash_code("042042");
        assert!(codes_match("042042", &hash));
        assert!(!codes_match("042043", &hash));
    }

    #[test]
    fn mismatched_hash_length_never_matches() {
        assert!(!codes_match("123456", b"short"));
    }

    #[test]
    fn method_strings_match_schema_constraint() {
        assert_eq!(ChallengeMethod::Email.as_str(), "email");
        assert_eq!(ChallengeMethod::Sms.as_str(), "sms");
    }

    #[test]
    fn method_deserializes_lowercase() {
        let method: ChallengeMethod = serde_json::from_str("\"sms\"").expect("deserialize");
        assert_eq!(method, ChallengeMethod::Sms);
    }
}
