//! Same-origin HTTP endpoint that hands out short-lived credentials.
//!
//! The master credential never leaves this side; clients only ever see the
//! tokens minted from it.

mod handlers;
mod issuer;
mod routes;

pub use handlers::TokenEndpointState;
pub use issuer::{CacheLister, IssueError, TokenIssuer, TokenScope};
pub use routes::{serve, token_routes};
