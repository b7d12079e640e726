//! Relay error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::storage::LockError;

/// Failures of the versioned vault store.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Vault not found")]
    NotFound,

    #[error("Vault version conflict")]
    Conflict,

    #[error("Invalid vault id: {0}")]
    InvalidId(String),

    #[error("Version out of range: {0}")]
    InvalidVersion(u64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Failures of the user account store.
#[derive(Error, Debug)]
pub enum UserError {
    #[error("Login already exists")]
    LoginAlreadyExists,

    #[error("Invalid login or password")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Relay server error types mapped to HTTP status codes.
#[derive(Debug)]
pub enum RelayError {
    Database(String),
    Auth(String),
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    Internal(String),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Auth(e) => write!(f, "Auth error: {}", e),
            Self::NotFound(e) => write!(f, "Not found: {}", e),
            Self::Conflict(e) => write!(f, "Conflict: {}", e),
            Self::BadRequest(e) => write!(f, "Bad request: {}", e),
            Self::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            Self::Auth(e) => (StatusCode::UNAUTHORIZED, e.clone()),
            Self::NotFound(e) => (StatusCode::NOT_FOUND, e.clone()),
            Self::Conflict(e) => (StatusCode::CONFLICT, e.clone()),
            Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<LockError> for RelayError {
    fn from(e: LockError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<VaultError> for RelayError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::NotFound => Self::NotFound(e.to_string()),
            VaultError::Conflict => Self::Conflict(e.to_string()),
            VaultError::InvalidId(_) | VaultError::InvalidVersion(_) => {
                Self::BadRequest(e.to_string())
            }
            VaultError::Database(e) => e.into(),
            VaultError::Lock(e) => e.into(),
        }
    }
}

impl From<UserError> for RelayError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::LoginAlreadyExists => Self::Conflict(e.to_string()),
            UserError::InvalidCredentials => Self::Auth(e.to_string()),
            UserError::Hash(e) => Self::Internal(e),
            UserError::Database(e) => e.into(),
            UserError::Lock(e) => e.into(),
        }
    }
}
