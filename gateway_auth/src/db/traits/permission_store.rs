use crate::{db_types::Permission, AuthApiError};

/// Read-only access to the permission table.
#[allow(async_fn_in_trait)]
pub trait PermissionStore {
    async fn fetch_permissions(&self) -> Result<Vec<Permission>, AuthApiError>;
}
