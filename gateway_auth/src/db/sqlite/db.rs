use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{api_keys, audit, new_pool, nonces, permissions, SqliteDatabaseError};
use crate::{
    db::traits::{ApiKeyStore, AuditLog, AuthGatewayDatabase, NonceStore, PermissionStore},
    db_types::{ApiKey, AuthEvent, NewApiKey, NewAuthDetail, NewAuthEvent, NonceRecord, Permission, PermissionId, RoleId},
    AuthApiError,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl NonceStore for SqliteDatabase {
    async fn insert_nonce(&self, record: &NonceRecord) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        nonces::insert_nonce(record, &mut conn).await
    }

    async fn consume_nonce(&self, jti: &str) -> Result<bool, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        nonces::consume_nonce(jti, &mut conn).await
    }

    async fn purge_expired_nonces(&self, now: DateTime<Utc>) -> Result<u64, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        let purged = nonces::purge_expired_nonces(now, &mut conn).await?;
        trace!("🗃️ Purged {purged} expired nonces");
        Ok(purged)
    }
}

impl ApiKeyStore for SqliteDatabase {
    async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKey, AuthApiError> {
        let mut tx = self.pool.begin().await?;
        let key = api_keys::insert_api_key(key, &mut tx).await?;
        tx.commit().await?;
        Ok(key)
    }

    async fn fetch_api_key(&self, id: &str) -> Result<Option<ApiKey>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        api_keys::fetch_api_key(id, &mut conn).await
    }

    async fn api_key_grants_permission(
        &self,
        key_hash: &str,
        permission: PermissionId,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        api_keys::api_key_grants_permission(key_hash, permission, now, &mut conn).await
    }

    async fn update_api_key_role(&self, id: &str, role_id: RoleId) -> Result<(), AuthApiError> {
        let mut tx = self.pool.begin().await?;
        api_keys::update_api_key_role(id, role_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ API key {id} now has role {role_id}");
        Ok(())
    }

    async fn revoke_api_key(&self, id: &str) -> Result<(), AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        api_keys::revoke_api_key(id, &mut conn).await?;
        debug!("🗃️ API key {id} revoked");
        Ok(())
    }
}

impl AuditLog for SqliteDatabase {
    async fn record_auth_event(
        &self,
        event: NewAuthEvent,
        detail: Option<NewAuthDetail>,
    ) -> Result<String, AuthApiError> {
        let mut tx = self.pool.begin().await?;
        let id = audit::insert_auth_event(event, detail, &mut tx).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn fetch_auth_events_for_jti(&self, jti: &str) -> Result<Vec<AuthEvent>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_auth_events_for_jti(jti, &mut conn).await
    }

    async fn fetch_recent_auth_events(&self, limit: u32) -> Result<Vec<AuthEvent>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        audit::fetch_recent_auth_events(limit, &mut conn).await
    }
}

impl PermissionStore for SqliteDatabase {
    async fn fetch_permissions(&self) -> Result<Vec<Permission>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        permissions::fetch_permissions(&mut conn).await
    }
}

impl AuthGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) {
        self.pool.close().await;
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every startup.
    pub async fn migrate(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// True if a nonce record for `jti` is still present. Used by maintenance tooling and tests; the verifier never
    /// reads before it deletes.
    pub async fn nonce_exists(&self, jti: &str) -> Result<bool, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        nonces::nonce_exists(jti, &mut conn).await
    }
}
