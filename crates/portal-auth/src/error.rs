//! Authentication error types.

use thiserror::Error;

/// Coarse failure category surfaced to callers and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input (empty email or password, bad request body).
    Validation,
    /// The authority rejected the credentials.
    Authentication,
    /// The session could not be kept alive; the user must log in again.
    SessionExpired,
    /// Transport failure, malformed response, or local storage failure.
    Network,
    /// The backend answered with a non-success status unrelated to auth.
    Api,
    /// Programming or configuration error.
    Internal,
}

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Input rejected before any network call
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The authority refused the refresh credential
    #[error("Token refresh rejected with HTTP {status}")]
    RefreshRejected { status: u16 },

    /// Session expired and could not be refreshed
    #[error("Session expired")]
    SessionExpired,

    /// Session was rejected by the authority (revoked, logged out elsewhere, etc.)
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// No session is held
    #[error("Not logged in")]
    NotLoggedIn,

    /// A login/logout happened while this operation was in flight
    #[error("Operation superseded by a newer login or logout")]
    Superseded,

    /// Non-success response from the backend
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] portal_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            AuthError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map this error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) | AuthError::Json(_) => ErrorKind::Validation,
            AuthError::InvalidCredentials(_) => ErrorKind::Authentication,
            AuthError::RefreshRejected { .. }
            | AuthError::SessionExpired
            | AuthError::SessionInvalid(_)
            | AuthError::NotLoggedIn
            | AuthError::Superseded => ErrorKind::SessionExpired,
            AuthError::Api { .. } => ErrorKind::Api,
            AuthError::MalformedResponse(_) | AuthError::Storage(_) | AuthError::Http(_) => {
                ErrorKind::Network
            }
            AuthError::InvalidStateTransition(_)
            | AuthError::InvalidUrl(_)
            | AuthError::Config(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::RefreshRejected { status } | AuthError::Api { status, .. } => Some(*status),
            AuthError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<portal_config_and_utils::CoreError> for AuthError {
    fn from(err: portal_config_and_utils::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
