use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{db_types::NonceRecord, AuthApiError};

pub async fn insert_nonce(record: &NonceRecord, conn: &mut SqliteConnection) -> Result<(), AuthApiError> {
    let created_at = record.created_at.timestamp();
    let expires_at = record.expires_at.map(|t| t.timestamp());
    let result = sqlx::query("INSERT INTO nonces (jti, created_at, expires_at) VALUES (?, ?, ?)")
        .bind(&record.jti)
        .bind(created_at)
        .bind(expires_at)
        .execute(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(de) if de.is_unique_violation() => {
                AuthApiError::PersistenceError(format!("A nonce record for {} already exists", record.jti))
            },
            e => AuthApiError::PersistenceError(e.to_string()),
        })?;
    match result.rows_affected() {
        1 => {
            trace!("🗃️ Nonce {} stored", record.jti);
            Ok(())
        },
        n => Err(AuthApiError::PersistenceError(format!("Nonce insert for {} affected {n} rows", record.jti))),
    }
}

/// A single conditional delete. The affected-row count is the redemption proof.
pub async fn consume_nonce(jti: &str, conn: &mut SqliteConnection) -> Result<bool, AuthApiError> {
    let result = sqlx::query("DELETE FROM nonces WHERE jti = ?").bind(jti).execute(conn).await?;
    let affected = result.rows_affected();
    debug!("🗃️ Consuming nonce {jti} affected {affected} rows");
    Ok(affected > 0)
}

pub async fn purge_expired_nonces(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, AuthApiError> {
    let result = sqlx::query("DELETE FROM nonces WHERE expires_at IS NOT NULL AND expires_at < ?")
        .bind(now.timestamp())
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn nonce_exists(jti: &str, conn: &mut SqliteConnection) -> Result<bool, AuthApiError> {
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM nonces WHERE jti = ?").bind(jti).fetch_one(conn).await?;
    Ok(count > 0)
}
