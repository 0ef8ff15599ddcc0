//! Protected sample endpoint: who is behind this access token.
//!
//! Exists so the step-up gate has a first-party consumer; every other
//! protected surface in the platform applies the same `require_access` gate.

use anyhow::Context;
use axum::{Json, extract::Extension, http::HeaderMap};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::AuthState;
use super::auth::principal::require_access;
use crate::error::AuthError;

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub last_active: Option<String>,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "The authenticated account", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = crate::error::ErrorBody),
        (status = 403, description = "Two-factor verification pending", body = crate::error::ErrorBody)
    ),
    tag = "me"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> Result<Json<MeResponse>, AuthError> {
    let identity = require_access(&headers, &state).await?;

    let query = r#"
        SELECT to_char(last_active AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS last_active
        FROM users
        WHERE id = $1
        LIMIT 1
    "#;
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identity.user_id)
        .fetch_optional(&pool.0)
        .instrument(span)
        .await
        .context("failed to fetch account")?
        .ok_or(AuthError::UserNotFound)?;

    Ok(Json(MeResponse {
        id: identity.user_id,
        email: identity.email,
        last_active: row.get("last_active"),
    }))
}
