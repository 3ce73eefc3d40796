//! HTTP handlers for the token endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::issuer::{CacheLister, TokenIssuer, TokenScope};

#[derive(Clone)]
pub struct TokenEndpointState {
    issuer: Arc<dyn TokenIssuer>,
    caches: Arc<dyn CacheLister>,
    token_lifetime: Duration,
}

impl TokenEndpointState {
    pub fn new(
        issuer: Arc<dyn TokenIssuer>,
        caches: Arc<dyn CacheLister>,
        token_lifetime: Duration,
    ) -> Self {
        Self {
            issuer,
            caches,
            token_lifetime,
        }
    }
}

/// GET /api/momento/token - Mint a short-lived read/write token
pub async fn get_token(State(state): State<TokenEndpointState>) -> Response {
    match state
        .issuer
        .generate_auth_token(TokenScope::AllDataReadWrite, state.token_lifetime)
        .await
    {
        Ok(token) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            token,
        )
            .into_response(),
        Err(err) => {
            log::error!("Unable to get token: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// GET /api/momento/caches - List cache names
pub async fn list_caches(State(state): State<TokenEndpointState>) -> Response {
    match state.caches.list_caches().await {
        Ok(names) => (StatusCode::OK, Json(names)).into_response(),
        Err(err) => {
            log::error!("Unable to list caches: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
