//! Auth error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! `login`, `register` and `update_user` return these errors and leave the
//! session untouched. `check_auth` and `logout` never surface them; the
//! background refresh sweep only logs them.

use crate::storage::StorageError;

/// Coarse error classes exposed to UI code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthErrorKind {
    InvalidCredentials,
    NotAuthenticated,
    NetworkError,
    TokenExpiredUnrecoverable,
    ValidationError,
    StorageError,
}

/// Errors produced by session operations and backend calls.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The backend rejected the email/password pair.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The operation needs a session and there is none.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The backend could not be reached, timed out, or sent an unreadable body.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("backend error: status {status}: {message}")]
    Backend { status: u16, message: String },

    /// The token expired and could not be refreshed.
    #[error("session expired and could not be refreshed")]
    TokenExpiredUnrecoverable,

    /// The payload was rejected as malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The session could not be written to persistent storage.
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuthError {
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            Self::NotAuthenticated => AuthErrorKind::NotAuthenticated,
            Self::Network(_) | Self::Backend { .. } => AuthErrorKind::NetworkError,
            Self::TokenExpiredUnrecoverable => AuthErrorKind::TokenExpiredUnrecoverable,
            Self::Validation(_) => AuthErrorKind::ValidationError,
            Self::Storage(_) => AuthErrorKind::StorageError,
        }
    }

    /// Stable machine-readable code for logs and UI telemetry.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "E_INVALID_CREDENTIALS",
            Self::NotAuthenticated => "E_NOT_AUTHENTICATED",
            Self::Network(_) => "E_NETWORK",
            Self::Backend { .. } => "E_BACKEND",
            Self::TokenExpiredUnrecoverable => "E_TOKEN_EXPIRED",
            Self::Validation(_) => "E_VALIDATION",
            Self::Storage(_) => "E_STORAGE",
        }
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Backend { status: 429 | 500..=599, .. })
    }

    /// Human-readable reason for an error toast.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid email or password.".to_owned(),
            Self::NotAuthenticated => "Please sign in to continue.".to_owned(),
            Self::Network(_) => "Unable to reach the server. Check your connection and try again.".to_owned(),
            Self::Backend { .. } => "The server could not complete the request. Please try again.".to_owned(),
            Self::TokenExpiredUnrecoverable => "Your session has expired. Please sign in again.".to_owned(),
            Self::Validation(message) => message.clone(),
            Self::Storage(_) => "Your session could not be saved on this device.".to_owned(),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
