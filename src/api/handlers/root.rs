//! Root endpoint: a minimal service banner.

use axum::response::IntoResponse;

pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, response::IntoResponse};

    #[tokio::test]
    async fn banner_names_the_service() {
        let response = root().await.into_response();
        let bytes = to_bytes(response.into_body(), 1024).await.expect("body");
        let body = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(body.starts_with("amora-auth"));
    }
}
