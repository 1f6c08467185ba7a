use crate::{
    db_types::{AuthEvent, NewAuthDetail, NewAuthEvent},
    AuthApiError,
};

/// Append-only record of authentication attempts.
#[allow(async_fn_in_trait)]
pub trait AuditLog {
    /// Writes an event, and its detail record if one is given, as a single atomic unit. Returns the new event id.
    async fn record_auth_event(&self, event: NewAuthEvent, detail: Option<NewAuthDetail>)
        -> Result<String, AuthApiError>;

    /// Fetches every event whose detail record references `jti`, oldest first.
    async fn fetch_auth_events_for_jti(&self, jti: &str) -> Result<Vec<AuthEvent>, AuthApiError>;

    /// Fetches the most recent `limit` events, newest first.
    async fn fetch_recent_auth_events(&self, limit: u32) -> Result<Vec<AuthEvent>, AuthApiError>;
}
