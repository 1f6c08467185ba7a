use std::fmt::Debug;

use chrono::{Duration, Utc};
use gateway_common::Secret;
use log::{debug, info, warn};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::{
    db::traits::ApiKeyStore,
    db_types::{ApiKey, NewApiKey, PermissionId, RoleId},
    helpers::sha256_hex,
    AuthApiError,
};

/// API keys last a month unless the caller asks otherwise.
pub const DEFAULT_API_KEY_TTL: Duration = Duration::minutes(43_800);
/// Keys that expire at all expire within five years.
pub const MAX_API_KEY_TTL: Duration = Duration::days(1826);
const API_KEY_BYTES: usize = 32;

/// The result of [`ApiKeyManager::generate`]. This is the only time the raw key is ever available.
#[derive(Debug)]
pub struct GeneratedApiKey {
    pub raw_key: Secret<String>,
    pub record: ApiKey,
}

/// Generates, checks and administers API keys. Raw keys only ever exist in the caller's hands; the store sees hashes.
pub struct ApiKeyManager<B> {
    db: B,
}

impl<B: Debug> Debug for ApiKeyManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKeyManager ({:?})", self.db)
    }
}

/// The digest under which a raw key is stored.
pub fn hash_api_key(raw_key: &str) -> String {
    sha256_hex(raw_key)
}

impl<B> ApiKeyManager<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> ApiKeyManager<B>
where B: ApiKeyStore
{
    /// Creates a new key bound to `role_id`. `ttl` of `None` creates a key that never expires.
    pub async fn generate(
        &self,
        name: &str,
        role_id: RoleId,
        ttl: Option<Duration>,
    ) -> Result<GeneratedApiKey, AuthApiError> {
        let now = Utc::now();
        let expires_at = match ttl {
            None => None,
            Some(ttl) if ttl <= Duration::zero() || ttl > MAX_API_KEY_TTL => {
                return Err(AuthApiError::InvalidRequest(format!(
                    "API key lifetime must be positive and at most {} days",
                    MAX_API_KEY_TTL.num_days()
                )));
            },
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or_else(|| {
                AuthApiError::InvalidRequest("API key expiry is out of range".to_string())
            })?),
        };
        let mut key_bytes = [0u8; API_KEY_BYTES];
        OsRng.fill_bytes(&mut key_bytes);
        let raw_key = Secret::new(base64::encode_config(key_bytes, base64::URL_SAFE_NO_PAD));
        let key = NewApiKey {
            id: Uuid::new_v4().to_string(),
            key_hash: hash_api_key(raw_key.reveal()),
            name: name.to_string(),
            role_id,
            expires_at,
        };
        let record = self.db.insert_api_key(key).await?;
        info!("🔐️ Generated API key {} ({}) for role {role_id}", record.id, record.name);
        Ok(GeneratedApiKey { raw_key, record })
    }

    /// Succeeds iff `raw_key` belongs to an active, unexpired key whose role grants `command`.
    pub async fn verify(&self, raw_key: &str, command: PermissionId) -> Result<(), AuthApiError> {
        let key_hash = hash_api_key(raw_key);
        let granted = self.db.api_key_grants_permission(&key_hash, command, Utc::now()).await?;
        if granted {
            debug!("🔐️ API key grants permission {command}");
            Ok(())
        } else {
            warn!("🔐️ API key does not exist, has expired, or does not grant permission {command}");
            Err(AuthApiError::ApiKeyInvalid)
        }
    }

    pub async fn update_role(&self, key_id: &str, role_id: RoleId) -> Result<(), AuthApiError> {
        self.db.update_api_key_role(key_id, role_id).await?;
        info!("🔐️ API key {key_id} moved to role {role_id}");
        Ok(())
    }

    pub async fn revoke(&self, key_id: &str) -> Result<(), AuthApiError> {
        self.db.revoke_api_key(key_id).await?;
        info!("🔐️ API key {key_id} revoked");
        Ok(())
    }

    pub async fn fetch(&self, key_id: &str) -> Result<Option<ApiKey>, AuthApiError> {
        self.db.fetch_api_key(key_id).await
    }
}
