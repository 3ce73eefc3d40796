//! HTTP routes for the token endpoint.

use axum::{Router, routing::get};
use tokio::net::TcpListener;

use crate::network::credentials::{CACHES_PATH, TOKEN_PATH};

use super::handlers::{TokenEndpointState, get_token, list_caches};

pub fn token_routes(state: TokenEndpointState) -> Router {
    Router::new()
        .route(TOKEN_PATH, get(get_token))
        .route(CACHES_PATH, get(list_caches))
        .with_state(state)
}

/// Serves the token endpoint until the listener fails.
pub async fn serve(listener: TcpListener, state: TokenEndpointState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Token endpoint listening on http://{addr}");
    }
    axum::serve(listener, token_routes(state)).await
}
