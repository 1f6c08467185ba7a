//! # Storage contracts for the auth subsystem.
//!
//! These traits define what a database backend must provide for token issuance and verification. They are
//! deliberately narrow so that the issuer and verifier can be constructed over exactly the stores they need, and so
//! that tests can substitute mocks.
//!
//! * [`NonceStore`] holds the set of outstanding single-use token ids. Its consume operation is the replay guard.
//! * [`ApiKeyStore`] holds hashed API keys and answers permission questions via the role-permission mapping.
//! * [`AuditLog`] records authentication attempts and their outcomes.
//! * [`PermissionStore`] exposes the static `(method, path) -> permission` table.
//! * [`AuthGatewayDatabase`] bundles all of the above for backends that implement everything.
mod api_key_store;
mod audit_log;
mod auth_gateway_database;
mod nonce_store;
mod permission_store;

pub use api_key_store::ApiKeyStore;
pub use audit_log::AuditLog;
pub use auth_gateway_database::AuthGatewayDatabase;
pub use nonce_store::NonceStore;
pub use permission_store::PermissionStore;
