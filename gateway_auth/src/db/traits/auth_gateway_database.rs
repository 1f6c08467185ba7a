use super::{ApiKeyStore, AuditLog, NonceStore, PermissionStore};

/// The highest level of behaviour for backends supporting the auth subsystem: every store the issuer, verifier and
/// key manager need, behind one cheaply cloneable handle.
#[allow(async_fn_in_trait)]
pub trait AuthGatewayDatabase: Clone + NonceStore + ApiKeyStore + AuditLog + PermissionStore {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the underlying connection pool. Outstanding handles become unusable.
    async fn close(&mut self);
}
