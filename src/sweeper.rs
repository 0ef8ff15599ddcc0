//! Periodic cleanup of rows that can no longer affect any decision.
//!
//! The sweep is idempotent and safe to run alongside live traffic and other
//! instances: every statement only touches rows that are already invalid, so
//! a row consumed by a concurrent request is simply a no-op here. Failures
//! are logged and retried on the next tick.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::config::AuthConfig;
use crate::guard::lockout::LockoutPolicy;
use crate::guard::rate_limit;
use crate::session::SessionStore;
use crate::{token, twofactor};

/// Keep invalid token/challenge rows around briefly for forensics before
/// deleting them.
const PURGE_GRACE_SECONDS: i64 = 24 * 60 * 60;

/// Spawn the background sweep loop.
pub fn spawn(pool: PgPool, config: Arc<AuthConfig>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(config.sweep_interval_seconds().max(1));
        let sessions = SessionStore::new(pool.clone(), config.clone());
        let lockouts = LockoutPolicy::new(pool.clone(), config.clone());

        loop {
            run_once(&pool, &config, &sessions, &lockouts).await;
            sleep(interval).await;
        }
    })
}

async fn run_once(
    pool: &PgPool,
    config: &AuthConfig,
    sessions: &SessionStore,
    lockouts: &LockoutPolicy,
) {
    match sessions.expire_overdue().await {
        Ok(count) if count > 0 => debug!(count, "expired overdue sessions"),
        Ok(_) => {}
        Err(err) => error!("session sweep failed: {err:#}"),
    }

    match lockouts.release_expired().await {
        Ok(count) if count > 0 => debug!(count, "released expired lockouts"),
        Ok(_) => {}
        Err(err) => error!("lockout sweep failed: {err:#}"),
    }

    match token::purge_stale(pool, PURGE_GRACE_SECONDS).await {
        Ok(count) if count > 0 => debug!(count, "purged stale refresh tokens"),
        Ok(_) => {}
        Err(err) => error!("refresh token sweep failed: {err:#}"),
    }

    match twofactor::purge_stale(pool, PURGE_GRACE_SECONDS).await {
        Ok(count) if count > 0 => debug!(count, "purged stale two-factor challenges"),
        Ok(_) => {}
        Err(err) => error!("challenge sweep failed: {err:#}"),
    }

    match rate_limit::prune_attempts(pool, config.attempt_retention_seconds()).await {
        Ok(count) if count > 0 => debug!(count, "pruned old login attempts"),
        Ok(_) => {}
        Err(err) => error!("login attempt sweep failed: {err:#}"),
    }
}
