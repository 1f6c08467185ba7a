use chrono::{DateTime, Utc};

use crate::{db_types::NonceRecord, AuthApiError};

/// The persistent set of issued-but-unredeemed token ids.
#[allow(async_fn_in_trait)]
pub trait NonceStore {
    /// Persists a new nonce record. Implementations must fail if a record for the same `jti` already exists, so that a
    /// jti never has more than one live record.
    async fn insert_nonce(&self, record: &NonceRecord) -> Result<(), AuthApiError>;

    /// Atomically deletes the record for `jti`, if present, and reports whether a record was deleted.
    ///
    /// This must be a single conditional delete against the store, not a read followed by a delete. When several
    /// callers race to consume the same `jti`, exactly one of them may see `true`.
    async fn consume_nonce(&self, jti: &str) -> Result<bool, AuthApiError>;

    /// Removes every record whose `expires_at` is earlier than `now`. Returns the number of records removed.
    async fn purge_expired_nonces(&self, now: DateTime<Utc>) -> Result<u64, AuthApiError>;
}
