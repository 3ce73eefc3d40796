//! Error types shared by the session, subscription and publish paths.

use std::fmt;

use thiserror::Error;

/// Failure to obtain a short-lived credential from the token endpoint.
///
/// Always fatal to the session construction that needed the credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialFetchError {
    #[error("token endpoint request failed: {0}")]
    Request(String),

    #[error("token endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token endpoint returned an empty credential")]
    EmptyCredential,

    #[error("unable to decode token endpoint response: {0}")]
    Decode(String),
}

/// Classification of a failed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The credential backing the call is expired or unknown.
    Authentication,
    InvalidArgument,
    NotFound,
    Unavailable,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Authentication => "AUTHENTICATION_ERROR",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT_ERROR",
            ErrorCode::NotFound => "NOT_FOUND_ERROR",
            ErrorCode::Unavailable => "SERVER_UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL_SERVER_ERROR",
        };
        f.write_str(name)
    }
}

/// Error result of any call against the hosted pub/sub or cache service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: ErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Authentication, message)
    }

    /// True when the call failed because the credential expired, which is
    /// the only failure the refresh protocol reacts to.
    pub fn is_authentication(&self) -> bool {
        self.code == ErrorCode::Authentication
    }
}

/// Errors surfaced to callers of the subscription controller and publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("credential fetch failed: {0}")]
    CredentialFetch(#[from] CredentialFetchError),

    #[error("unable to construct transport clients: {0}")]
    ClientConstruction(TransportError),

    #[error("unable to subscribe to topic: {0}")]
    Subscribe(TransportError),

    #[error("failed to publish to topic: {0}")]
    Publish(TransportError),

    #[error("re-authentication gave up after {attempts} attempts")]
    ReauthExhausted { attempts: u32 },

    #[error("failed to encode chat event: {0}")]
    Encode(String),
}

/// An inbound topic item that is not a recognised chat event.
#[derive(Debug, Error)]
#[error("unable to parse chat message: {0}")]
pub struct PayloadParseError(#[from] serde_json::Error);

/// Errors raised while reading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("retry.base_delay_ms exceeds retry.max_delay_ms")]
    InvalidBackoff,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),

    #[error("Unable to access config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: String, message: String },
}
