use std::collections::HashMap;

use log::{debug, info, warn};

use crate::{
    db::traits::PermissionStore,
    db_types::{Permission, PermissionId},
    AuthApiError,
};

/// Normalizes a request path for permission lookup: the query string is dropped, and then a single trailing slash, if
/// present. The root path is left alone.
///
/// The same rule must be used wherever a path is turned into a permission, so that a token issued for `/customers`
/// is accepted for `/customers/` and `/customers/?x=1` alike.
pub fn normalize_path(path: &str) -> &str {
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => path,
    }
}

/// Static lookup of `(method, normalized path)` to permission id.
///
/// The registry is built once, either from a [`PermissionStore`] at startup or from a list of permissions, and is
/// never refreshed per request. Share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct PermissionRegistry {
    permissions: HashMap<(String, String), PermissionId>,
}

impl PermissionRegistry {
    pub fn from_permissions<I: IntoIterator<Item = Permission>>(permissions: I) -> Self {
        let mut map = HashMap::new();
        for p in permissions {
            let key = (p.method.to_ascii_uppercase(), normalize_path(&p.path).to_string());
            if let Some(old) = map.insert(key, p.id) {
                warn!("🔐️ Permission {} for {} {} replaces permission {old}", p.id, p.method, p.path);
            }
        }
        Self { permissions: map }
    }

    /// Loads the full permission table from the store.
    pub async fn load<B: PermissionStore>(store: &B) -> Result<Self, AuthApiError> {
        let permissions = store.fetch_permissions().await?;
        let registry = Self::from_permissions(permissions);
        info!("🔐️ Loaded {} permissions", registry.len());
        Ok(registry)
    }

    /// Resolves the permission required for `method` on `path`. `path` may be raw; it is normalized here.
    pub fn resolve(&self, method: &str, path: &str) -> Option<PermissionId> {
        let normalized = normalize_path(path);
        let result = self.permissions.get(&(method.to_ascii_uppercase(), normalized.to_string())).copied();
        debug!("🔐️ {method} {normalized} resolves to {result:?}");
        result
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}
