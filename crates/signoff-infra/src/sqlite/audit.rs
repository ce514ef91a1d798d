//! SQLite audit log repository.

use signoff_core::repository::audit::AuditRepository;
use signoff_types::audit::{AuditAction, AuditLogEntry};
use signoff_types::error::RepositoryError;
use signoff_types::id::InstanceId;
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_id, query_err, to_json};

pub struct SqliteAuditRepository {
    pool: DatabasePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Insert an entry on an open connection or transaction.
pub(crate) async fn insert_audit(
    conn: &mut SqliteConnection,
    entry: &AuditLogEntry,
) -> Result<(), RepositoryError> {
    let details = entry.details.as_ref().map(to_json).transpose()?;

    sqlx::query(
        "INSERT INTO audit_logs (id, instance_id, action, actor_id, resource_type, resource_id, details, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id.to_string())
    .bind(entry.instance_id.map(|id| id.to_string()))
    .bind(entry.action.as_str())
    .bind(entry.actor_id.map(|id| id.to_string()))
    .bind(&entry.resource_type)
    .bind(&entry.resource_id)
    .bind(details)
    .bind(format_datetime(&entry.created_at))
    .execute(&mut *conn)
    .await
    .map_err(query_err)?;

    Ok(())
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditLogEntry, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let instance_id: Option<String> = row.try_get("instance_id").map_err(query_err)?;
    let action: String = row.try_get("action").map_err(query_err)?;
    let actor_id: Option<String> = row.try_get("actor_id").map_err(query_err)?;
    let details: Option<String> = row.try_get("details").map_err(query_err)?;
    let created_at: String = row.try_get("created_at").map_err(query_err)?;

    Ok(AuditLogEntry {
        id: parse_id("audit", &id)?,
        instance_id: instance_id.as_deref().map(|s| parse_id("request", s)).transpose()?,
        action: action
            .parse::<AuditAction>()
            .map_err(RepositoryError::Query)?,
        actor_id: actor_id.as_deref().map(|s| parse_id("user", s)).transpose()?,
        resource_type: row.try_get("resource_type").map_err(query_err)?,
        resource_id: row.try_get("resource_id").map_err(query_err)?,
        details: details.as_deref().map(|s| from_json("details", s)).transpose()?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), RepositoryError> {
        let mut conn = self.pool.writer.acquire().await.map_err(query_err)?;
        insert_audit(&mut conn, entry).await
    }

    async fn list_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM audit_logs WHERE instance_id = ? ORDER BY seq ASC")
            .bind(instance_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM audit_logs ORDER BY seq DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(entry_from_row).collect()
    }
}
