//! Device fingerprinting and trust scoring.
//!
//! A device is recognized by a SHA-256 fingerprint over its normalized
//! client-reported characteristics. Trust accrues with consistent logins
//! (more when the network also matches), jumps after a verified two-factor
//! code, and drops on failed ones. Logins from devices under the trust
//! threshold require step-up verification.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AuthConfig;

const LOGIN_BONUS: i32 = 10;
const SAME_NETWORK_BONUS: i32 = 5;
const TWO_FACTOR_SUCCESS_BONUS: i32 = 30;
const TWO_FACTOR_FAILURE_PENALTY: i32 = -15;

/// Client-reported device characteristics sent with a login request.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub platform: Option<String>,
    pub device_name: Option<String>,
    pub app_version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub trust_score: i32,
    pub is_trusted: bool,
}

/// Stable fingerprint over normalized device characteristics.
#[must_use]
pub fn fingerprint(info: &DeviceInfo) -> String {
    let mut hasher = Sha256::new();
    for field in [
        &info.user_agent,
        &info.platform,
        &info.device_name,
        &info.app_version,
    ] {
        let normalized = field
            .as_deref()
            .map(|value| value.trim().to_lowercase())
            .unwrap_or_default();
        hasher.update(normalized.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Clamp a score adjustment into the 0..=100 band.
#[must_use]
pub const fn adjusted_score(current: i32, delta: i32) -> i32 {
    let next = current + delta;
    if next < 0 {
        0
    } else if next > 100 {
        100
    } else {
        next
    }
}

/// Coarse network identity: IPv4 /24 or IPv6 /64 prefix equality.
#[must_use]
pub fn same_network(a: &str, b: &str) -> bool {
    match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        (Ok(IpAddr::V4(a)), Ok(IpAddr::V4(b))) => a.octets()[..3] == b.octets()[..3],
        (Ok(IpAddr::V6(a)), Ok(IpAddr::V6(b))) => a.segments()[..4] == b.segments()[..4],
        _ => false,
    }
}

pub struct DeviceTrustEngine {
    pool: PgPool,
    config: Arc<AuthConfig>,
}

impl DeviceTrustEngine {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AuthConfig>) -> Self {
        Self { pool, config }
    }

    /// Register or update the device behind a successful credential check.
    /// Returns the device and whether it was seen for the first time.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn observe_login(
        &self,
        user_id: Uuid,
        info: &DeviceInfo,
        ip: Option<&str>,
    ) -> Result<(DeviceRecord, bool)> {
        let fingerprint = fingerprint(info);

        let query = r"
            SELECT id, trust_score, host(last_ip) AS last_ip
            FROM devices
            WHERE user_id = $1
              AND fingerprint = $2
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let existing = sqlx::query(query)
            .bind(user_id)
            .bind(&fingerprint)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up device")?;

        match existing {
            Some(row) => {
                let id: Uuid = row.get("id");
                let score: i32 = row.get("trust_score");
                let last_ip: Option<String> = row.get("last_ip");

                let mut delta = LOGIN_BONUS;
                if let (Some(current), Some(previous)) = (ip, last_ip.as_deref())
                    && same_network(current, previous)
                {
                    delta += SAME_NETWORK_BONUS;
                }
                let record = self.apply_delta(id, delta, ip).await?;
                Ok((record, false))
            }
            None => {
                let record = self.register(user_id, &fingerprint, ip).await?;
                Ok((record, true))
            }
        }
    }

    /// Score feedback from a two-factor attempt on this device.
    ///
    /// # Errors
    /// Returns an error on store failure.
    pub async fn record_two_factor(&self, device_id: Uuid, success: bool) -> Result<DeviceRecord> {
        let delta = if success {
            TWO_FACTOR_SUCCESS_BONUS
        } else {
            TWO_FACTOR_FAILURE_PENALTY
        };
        self.apply_delta(device_id, delta, None).await
    }

    async fn register(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        ip: Option<&str>,
    ) -> Result<DeviceRecord> {
        // ON CONFLICT covers two first-sight logins racing; the loser of the
        // insert still lands on the same row.
        let query = r"
            INSERT INTO devices (user_id, fingerprint, last_ip)
            VALUES ($1, $2, $3::inet)
            ON CONFLICT (user_id, fingerprint)
            DO UPDATE SET last_seen = NOW()
            RETURNING id, trust_score, is_trusted
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(fingerprint)
            .bind(ip)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to register device")?;

        Ok(DeviceRecord {
            id: row.get("id"),
            trust_score: row.get("trust_score"),
            is_trusted: row.get("is_trusted"),
        })
    }

    /// Atomic score adjustment with clamping and trust recomputation done in
    /// the store, so concurrent updates cannot lose increments.
    async fn apply_delta(
        &self,
        device_id: Uuid,
        delta: i32,
        ip: Option<&str>,
    ) -> Result<DeviceRecord> {
        let query = r"
            UPDATE devices
            SET trust_score = GREATEST(0, LEAST(100, trust_score + $2)),
                is_trusted = GREATEST(0, LEAST(100, trust_score + $2)) >= $3,
                last_seen = NOW(),
                last_ip = COALESCE($4::inet, last_ip)
            WHERE id = $1
            RETURNING id, trust_score, is_trusted
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(device_id)
            .bind(delta)
            .bind(self.config.trust_threshold())
            .bind(ip)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to update device trust")?;

        Ok(DeviceRecord {
            id: row.get("id"),
            trust_score: row.get("trust_score"),
            is_trusted: row.get("is_trusted"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(user_agent: &str, platform: &str) -> DeviceInfo {
        DeviceInfo {
            user_agent: Some(user_agent.to_string()),
            platform: Some(platform.to_string()),
            device_name: None,
            app_version: None,
        }
    }

    #[test]
    fn fingerprint_is_stable_under_case_and_whitespace() {
        let a = fingerprint(&info("Amora/2.1 iPhone", "iOS"));
        let b = fingerprint(&info("  amora/2.1 iphone ", "ios"));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_devices() {
        let a = fingerprint(&info("Amora/2.1 iPhone", "iOS"));
        let b = fingerprint(&info("Amora/2.1 Pixel", "Android"));
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_fields_do_not_collide_across_positions() {
        let a = fingerprint(&DeviceInfo {
            user_agent: Some("x".to_string()),
            platform: None,
            ..DeviceInfo::default()
        });
        let b = fingerprint(&DeviceInfo {
            user_agent: None,
            platform: Some("x".to_string()),
            ..DeviceInfo::default()
        });
        assert_ne!(a, b);
    }

    #[test]
    fn score_clamps_at_both_ends() {
        assert_eq!(adjusted_score(95, 10), 100);
        assert_eq!(adjusted_score(5, -15), 0);
        assert_eq!(adjusted_score(50, 10), 60);
        assert_eq!(adjusted_score(0, 0), 0);
    }

    #[test]
    fn same_network_matches_ipv4_prefix() {
        assert!(same_network("203.0.113.10", "203.0.113.250"));
        assert!(!same_network("203.0.113.10", "203.0.114.10"));
    }

    #[test]
    fn same_network_matches_ipv6_prefix() {
        assert!(same_network("2001:db8:1:2::1", "2001:db8:1:2:ffff::9"));
        assert!(!same_network("2001:db8:1:2::1", "2001:db8:1:3::1"));
    }

    #[test]
    fn same_network_rejects_mixed_or_garbage() {
        assert!(!same_network("203.0.113.10", "2001:db8::1"));
        assert!(!same_network("not-an-ip", "203.0.113.10"));
    }
}
