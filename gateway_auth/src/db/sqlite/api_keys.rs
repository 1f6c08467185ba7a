use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{ApiKey, NewApiKey, PermissionId, RoleId},
    AuthApiError,
};

#[derive(FromRow)]
struct ApiKeyRow {
    id: String,
    key_hash: String,
    name: String,
    role_id: i64,
    created_at: i64,
    expires_at: Option<i64>,
    active: i64,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthApiError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| AuthApiError::PersistenceError(format!("Invalid timestamp in api_keys table: {secs}")))
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = AuthApiError;

    fn try_from(row: ApiKeyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            key_hash: row.key_hash,
            name: row.name,
            role_id: RoleId(row.role_id),
            created_at: timestamp(row.created_at)?,
            expires_at: row.expires_at.map(timestamp).transpose()?,
            active: row.active != 0,
        })
    }
}

pub async fn role_exists(role_id: RoleId, conn: &mut SqliteConnection) -> Result<bool, AuthApiError> {
    let count: i64 =
        sqlx::query_scalar("SELECT count(*) FROM roles WHERE id = ?").bind(role_id.0).fetch_one(conn).await?;
    Ok(count > 0)
}

pub async fn insert_api_key(key: NewApiKey, conn: &mut SqliteConnection) -> Result<ApiKey, AuthApiError> {
    if !role_exists(key.role_id, &mut *conn).await? {
        return Err(AuthApiError::RoleNotFound);
    }
    let created_at = Utc::now().timestamp();
    let expires_at = key.expires_at.map(|t| t.timestamp());
    sqlx::query(
        "INSERT INTO api_keys (id, key_hash, name, role_id, created_at, expires_at, active) VALUES (?, ?, ?, ?, ?, ?, \
         1)",
    )
    .bind(&key.id)
    .bind(&key.key_hash)
    .bind(&key.name)
    .bind(key.role_id.0)
    .bind(created_at)
    .bind(expires_at)
    .execute(&mut *conn)
    .await?;
    debug!("🗃️ API key {} ({}) stored with role {}", key.id, key.name, key.role_id);
    fetch_api_key(&key.id, conn).await?.ok_or_else(|| {
        error!("🗃️ API key {} vanished immediately after it was inserted", key.id);
        AuthApiError::PersistenceError("API key was not stored".to_string())
    })
}

pub async fn fetch_api_key(id: &str, conn: &mut SqliteConnection) -> Result<Option<ApiKey>, AuthApiError> {
    let row: Option<ApiKeyRow> = sqlx::query_as(
        "SELECT id, key_hash, name, role_id, created_at, expires_at, active FROM api_keys WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.map(ApiKey::try_from).transpose()
}

pub async fn api_key_grants_permission(
    key_hash: &str,
    permission: PermissionId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, AuthApiError> {
    let is_valid: i64 = sqlx::query_scalar(
        r#"SELECT EXISTS (
            SELECT 1 FROM api_keys ak
            JOIN role_permissions rp ON ak.role_id = rp.role_id
            WHERE ak.key_hash = ?
              AND rp.permission_id = ?
              AND ak.active = 1
              AND (ak.expires_at IS NULL OR ak.expires_at > ?)
        )"#,
    )
    .bind(key_hash)
    .bind(permission.value())
    .bind(now.timestamp())
    .fetch_one(conn)
    .await?;
    Ok(is_valid != 0)
}

pub async fn update_api_key_role(id: &str, role_id: RoleId, conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    if !role_exists(role_id, &mut *conn).await? {
        return Err(AuthApiError::RoleNotFound);
    }
    let result = sqlx::query("UPDATE api_keys SET role_id = ? WHERE id = ?").bind(role_id.0).bind(id).execute(conn).await?;
    match result.rows_affected() {
        0 => Err(AuthApiError::ApiKeyNotFound),
        1 => Ok(()),
        n => Err(AuthApiError::PersistenceError(format!("Updating API key {id} affected {n} rows"))),
    }
}

pub async fn revoke_api_key(id: &str, conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    let result = sqlx::query("UPDATE api_keys SET active = 0 WHERE id = ?").bind(id).execute(conn).await?;
    match result.rows_affected() {
        0 => Err(AuthApiError::ApiKeyNotFound),
        1 => Ok(()),
        n => Err(AuthApiError::PersistenceError(format!("Updating API key {id} affected {n} rows"))),
    }
}
