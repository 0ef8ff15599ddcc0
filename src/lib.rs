//! # Amora Auth (Authentication & Session Security)
//!
//! `amora-auth` is the authentication backend of the Amora dating platform.
//! It owns credentials and session security; profile content, matching,
//! payments, and notifications live elsewhere and consume its decisions.
//!
//! ## Credentials
//!
//! - **Access tokens** are short-lived HS256 JWTs, verified purely by
//!   signature and expiry. They are never persisted.
//! - **Refresh tokens** are long-lived JWTs stored as SHA-256 hashes. A
//!   rotation chain has exactly one valid row at a time: rotation revokes the
//!   old row with a conditional update and checks the affected-row count, so
//!   a stolen or replayed token cannot yield two live sessions.
//!
//! ## Session security
//!
//! Logins from unrecognized devices start in `pending_2fa` and must clear an
//! out-of-band code before protected endpoints open up. Device trust accrues
//! with consistent logins and verified codes. Repeated failures trip a
//! time-boxed (or admin-only) account lockout, and every source is throttled
//! by rolling per-IP and per-email windows. Each branch of every flow lands
//! in an append-only security event log.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod password;
pub mod session;
pub mod sweeper;
pub mod token;
pub mod twofactor;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
