use thiserror::Error;

use crate::db_types::PermissionId;

/// Every failure the auth subsystem can produce.
///
/// The variants carry enough detail for server-side logs and the audit trail. None of this detail should reach the
/// external caller; use [`AuthApiError::severity`] to pick a transport status and reply with a generic message.
#[derive(Debug, Clone, Error)]
pub enum AuthApiError {
    #[error("No bearer credential was supplied")]
    MissingCredential,
    #[error("Token could not be decrypted or verified. {0}")]
    TokenInvalid(String),
    #[error("Token is unknown or has already been redeemed")]
    TokenReplayed,
    #[error("No permission is registered for {method} {path}")]
    UnknownEndpoint { method: String, path: String },
    #[error("Token was issued for permission {presented}, but the request requires permission {resolved}")]
    PermissionMismatch { resolved: PermissionId, presented: PermissionId },
    #[error("API key does not exist, has expired, or does not grant the requested permission")]
    ApiKeyInvalid,
    #[error("API key not found")]
    ApiKeyNotFound,
    #[error("The requested role does not exist")]
    RoleNotFound,
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// The error taxonomy, stripped of any payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingCredential,
    TokenInvalid,
    TokenReplayed,
    UnknownEndpoint,
    PermissionMismatch,
    ApiKeyInvalid,
    ApiKeyNotFound,
    RoleNotFound,
    InvalidRequest,
    PersistenceError,
}

/// How bad an error is, independent of any transport. The server maps these onto HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    BadRequest,
    Unauthorized,
    NotFound,
    Internal,
}

impl AuthApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::TokenInvalid(_) => ErrorKind::TokenInvalid,
            Self::TokenReplayed => ErrorKind::TokenReplayed,
            Self::UnknownEndpoint { .. } => ErrorKind::UnknownEndpoint,
            Self::PermissionMismatch { .. } => ErrorKind::PermissionMismatch,
            Self::ApiKeyInvalid => ErrorKind::ApiKeyInvalid,
            Self::ApiKeyNotFound => ErrorKind::ApiKeyNotFound,
            Self::RoleNotFound => ErrorKind::RoleNotFound,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::PersistenceError(_) => ErrorKind::PersistenceError,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            ErrorKind::MissingCredential |
            ErrorKind::TokenInvalid |
            ErrorKind::TokenReplayed |
            ErrorKind::PermissionMismatch |
            ErrorKind::ApiKeyInvalid => Severity::Unauthorized,
            ErrorKind::UnknownEndpoint | ErrorKind::ApiKeyNotFound => Severity::NotFound,
            ErrorKind::InvalidRequest | ErrorKind::RoleNotFound => Severity::BadRequest,
            ErrorKind::PersistenceError => Severity::Internal,
        }
    }

    /// Short, stable reason string recorded in the audit trail.
    pub fn audit_reason(&self) -> &'static str {
        match self.kind() {
            ErrorKind::MissingCredential => "missing credential",
            ErrorKind::TokenInvalid => "decrypt/signature failure",
            ErrorKind::TokenReplayed => "token unknown or already redeemed",
            ErrorKind::UnknownEndpoint => "unknown endpoint",
            ErrorKind::PermissionMismatch => "permission mismatch",
            ErrorKind::ApiKeyInvalid => "api key invalid",
            ErrorKind::ApiKeyNotFound => "api key not found",
            ErrorKind::RoleNotFound => "role not found",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::PersistenceError => "persistence error",
        }
    }
}

impl From<sqlx::Error> for AuthApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::PersistenceError(e.to_string())
    }
}
