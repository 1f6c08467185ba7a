use log::warn;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{Permission, PermissionId},
    AuthApiError,
};

#[derive(FromRow)]
struct PermissionRow {
    id: i64,
    method: String,
    path: String,
}

pub async fn fetch_permissions(conn: &mut SqliteConnection) -> Result<Vec<Permission>, AuthApiError> {
    let rows: Vec<PermissionRow> =
        sqlx::query_as("SELECT id, method, path FROM permissions ORDER BY id").fetch_all(conn).await?;
    let permissions = rows
        .into_iter()
        .filter_map(|row| match PermissionId::new(row.id) {
            Ok(id) => Some(Permission::new(id, row.method, row.path)),
            Err(e) => {
                warn!("🗃️ Skipping permission row for {} {}. {e}", row.method, row.path);
                None
            },
        })
        .collect();
    Ok(permissions)
}
