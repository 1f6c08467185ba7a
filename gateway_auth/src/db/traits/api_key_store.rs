use chrono::{DateTime, Utc};

use crate::{
    db_types::{ApiKey, NewApiKey, PermissionId, RoleId},
    AuthApiError,
};

/// Persistent store of hashed API keys and their role bindings.
///
/// None of these methods ever see raw key material. Callers hash keys before they reach the store.
#[allow(async_fn_in_trait)]
pub trait ApiKeyStore {
    /// Inserts a new key record. If `role_id` does not exist, [`AuthApiError::RoleNotFound`] is returned.
    async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKey, AuthApiError>;

    /// Fetches a key record by id. Revoked keys are still returned.
    async fn fetch_api_key(&self, id: &str) -> Result<Option<ApiKey>, AuthApiError>;

    /// True iff an active key with the given hash exists, has not expired at `now`, and its role is granted
    /// `permission`.
    async fn api_key_grants_permission(
        &self,
        key_hash: &str,
        permission: PermissionId,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthApiError>;

    /// Rebinds a key to a different role.
    async fn update_api_key_role(&self, id: &str, role_id: RoleId) -> Result<(), AuthApiError>;

    /// Soft-revokes a key. The record is kept so that the audit trail remains intact. Revoking a revoked key succeeds.
    async fn revoke_api_key(&self, id: &str) -> Result<(), AuthApiError>;
}
