use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::{
    db_types::{AuthEvent, AuthEventType, NewAuthDetail, NewAuthEvent, PermissionId},
    AuthApiError,
};

#[derive(FromRow)]
struct AuthEventRow {
    id: String,
    event_type: i64,
    success: i64,
    reason: String,
    ip: Option<String>,
    fingerprint: String,
    actor_id: Option<String>,
    created_at: i64,
    jti: Option<String>,
    command: Option<i64>,
    masked_subject: Option<String>,
}

impl TryFrom<AuthEventRow> for AuthEvent {
    type Error = AuthApiError;

    fn try_from(row: AuthEventRow) -> Result<Self, Self::Error> {
        let corrupt = |what: String| AuthApiError::PersistenceError(format!("Corrupt auth log row {}: {what}", row.id));
        let event_type = AuthEventType::try_from(row.event_type).map_err(|e| corrupt(e.to_string()))?;
        let created_at: DateTime<Utc> =
            Utc.timestamp_opt(row.created_at, 0).single().ok_or_else(|| corrupt("bad timestamp".into()))?;
        let command = row.command.map(PermissionId::new).transpose().map_err(|e| corrupt(e.to_string()))?;
        Ok(Self {
            id: row.id,
            event_type,
            success: row.success != 0,
            reason: row.reason,
            ip: row.ip,
            fingerprint: row.fingerprint,
            actor_id: row.actor_id,
            created_at,
            jti: row.jti,
            command,
            masked_subject: row.masked_subject,
        })
    }
}

const SELECT_EVENTS: &str = r#"SELECT e.id, e.event_type, e.success, e.reason, e.ip, e.fingerprint, e.actor_id,
    e.created_at, d.jti, d.command, d.masked_subject
    FROM auth_log_events e LEFT JOIN auth_log_details d ON d.log_id = e.id"#;

/// Inserts the event row and, if given, its detail row. Callers must supply a transaction so that both rows land
/// together.
pub async fn insert_auth_event(
    event: NewAuthEvent,
    detail: Option<NewAuthDetail>,
    conn: &mut SqliteConnection,
) -> Result<String, AuthApiError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO auth_log_events (id, event_type, success, reason, ip, fingerprint, actor_id, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(event.event_type.code())
    .bind(i64::from(event.success))
    .bind(&event.reason)
    .bind(event.ip.map(|ip| ip.to_string()))
    .bind(&event.fingerprint)
    .bind(&event.actor_id)
    .bind(Utc::now().timestamp())
    .execute(&mut *conn)
    .await?;
    if let Some(detail) = detail {
        sqlx::query("INSERT INTO auth_log_details (log_id, jti, command, masked_subject) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(&detail.jti)
            .bind(detail.command.value())
            .bind(&detail.masked_subject)
            .execute(&mut *conn)
            .await?;
    }
    Ok(id)
}

pub async fn fetch_auth_events_for_jti(jti: &str, conn: &mut SqliteConnection) -> Result<Vec<AuthEvent>, AuthApiError> {
    let q = format!("{SELECT_EVENTS} WHERE d.jti = ? ORDER BY e.rowid ASC");
    let rows: Vec<AuthEventRow> = sqlx::query_as(&q).bind(jti).fetch_all(conn).await?;
    rows.into_iter().map(AuthEvent::try_from).collect()
}

pub async fn fetch_recent_auth_events(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<AuthEvent>, AuthApiError> {
    let q = format!("{SELECT_EVENTS} ORDER BY e.rowid DESC LIMIT ?");
    let rows: Vec<AuthEventRow> = sqlx::query_as(&q).bind(i64::from(limit)).fetch_all(conn).await?;
    rows.into_iter().map(AuthEvent::try_from).collect()
}
