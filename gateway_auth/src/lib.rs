//! Payment Gateway Auth
//!
//! This library contains the authentication and authorization core of the payment gateway. It is transport-agnostic;
//! the HTTP surface lives in `gateway_server`.
//!
//! The library is divided into two main sections:
//! 1. Storage ([`mod@db`]). SQLite is the supported backend. The storage contracts are the traits in `db::traits`,
//!    and the data types that cross them are defined in [`mod@db_types`].
//! 2. The auth API ([`mod@auth_api`]). Single-use encrypted tokens, the permission registry, and API key management.
mod db;

pub mod auth_api;
pub mod db_types;
pub mod helpers;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use auth_api::{
    api_key_manager::{hash_api_key, ApiKeyManager, GeneratedApiKey, DEFAULT_API_KEY_TTL, MAX_API_KEY_TTL},
    errors::{AuthApiError, ErrorKind, Severity},
    permission_registry::{normalize_path, PermissionRegistry},
    token_codec::{AccessClaims, KeyMaterialError, TokenCodec, ENCRYPTION_KEY_LEN, MIN_SIGNING_SECRET_LEN},
    token_issuer::{IssueRequest, TokenIssuer, DEFAULT_TOKEN_TTL, MAX_TOKEN_TTL},
    token_verifier::{TokenVerifier, VerifiedSubject},
};
#[cfg(feature = "sqlite")]
pub use db::sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{ApiKeyStore, AuditLog, AuthGatewayDatabase, NonceStore, PermissionStore};
