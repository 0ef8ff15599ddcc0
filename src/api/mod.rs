//! HTTP server wiring: pool, auth state, middleware stack, and routes.

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

use crate::cli::globals::GlobalArgs;
use crate::config::AuthConfig;
use crate::sweeper;
use crate::twofactor::delivery::{CodeSender, LogCodeSender, WebhookCodeSender};
use handlers::{auth, health, me, root};

/// Start the server.
///
/// # Errors
/// Returns an error if the pool, listener, or router cannot be set up.
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs, config: AuthConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(Duration::from_secs(5))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let config = Arc::new(config);

    // Challenge codes go to the platform notification gateway when one is
    // configured; local development logs them instead.
    let sender: Arc<dyn CodeSender> = match &globals.two_factor_webhook_url {
        Some(url) => Arc::new(WebhookCodeSender::new(url.clone())?),
        None => Arc::new(LogCodeSender),
    };

    let auth_state = Arc::new(auth::AuthState::new(
        pool.clone(),
        config.clone(),
        &globals.jwt_secret,
        sender,
    ));

    // Expired rows are swept in the background; deletions of already-invalid
    // rows are safe alongside live traffic.
    sweeper::spawn(pool.clone(), config.clone());

    let app_origin = app_origin(&globals.app_base_url)?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(app_origin))
        .allow_credentials(true);

    let app = Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/v1/auth/login", post(auth::login::login))
        .route("/v1/auth/refresh", post(auth::refresh::refresh))
        .route("/v1/auth/logout", post(auth::refresh::logout))
        .route("/v1/auth/2fa/verify", post(auth::two_factor::verify))
        .route("/v1/me", get(me::me))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// The mobile/web app origin allowed by CORS.
fn app_origin(app_base_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(app_base_url).with_context(|| format!("Invalid app base URL: {app_base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("App base URL must include a valid host: {app_base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build app origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_origin_strips_path_and_keeps_port() {
        let origin = app_origin("https://app.amora.app:8443/login").expect("origin");
        assert_eq!(origin, "https://app.amora.app:8443");
    }

    #[test]
    fn app_origin_rejects_garbage() {
        assert!(app_origin("not a url").is_err());
    }
}
