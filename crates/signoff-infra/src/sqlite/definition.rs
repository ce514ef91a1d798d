//! SQLite workflow definition repository.
//!
//! Steps and transitions are stored as JSON columns; definitions are never
//! updated apart from `is_active`.

use signoff_core::repository::definition::DefinitionRepository;
use signoff_types::audit::AuditLogEntry;
use signoff_types::definition::WorkflowDefinition;
use signoff_types::error::RepositoryError;
use signoff_types::id::DefinitionId;
use sqlx::Row;

use super::audit::insert_audit;
use super::pool::DatabasePool;
use super::{format_datetime, from_json, map_unique, parse_datetime, parse_id, query_err, to_json};

pub struct SqliteDefinitionRepository {
    pool: DatabasePool,
}

impl SqliteDefinitionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct DefinitionRow {
    id: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    steps: String,
    transitions: String,
    created_by: Option<String>,
    created_at: String,
}

impl DefinitionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_active: row.try_get("is_active")?,
            steps: row.try_get("steps")?,
            transitions: row.try_get("transitions")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_definition(self) -> Result<WorkflowDefinition, RepositoryError> {
        Ok(WorkflowDefinition {
            id: parse_id("workflow", &self.id)?,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
            steps: from_json("steps", &self.steps)?,
            transitions: from_json("transitions", &self.transitions)?,
            created_by: self
                .created_by
                .as_deref()
                .map(|s| parse_id("user", s))
                .transpose()?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowDefinition, RepositoryError> {
    DefinitionRow::from_row(row)
        .map_err(query_err)?
        .into_definition()
}

impl DefinitionRepository for SqliteDefinitionRepository {
    async fn create(
        &self,
        definition: &WorkflowDefinition,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            "INSERT INTO workflows (id, name, description, is_active, steps, transitions, created_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(definition.id.to_string())
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(definition.is_active)
        .bind(to_json(&definition.steps)?)
        .bind(to_json(&definition.transitions)?)
        .bind(definition.created_by.map(|id| id.to_string()))
        .bind(format_datetime(&definition.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, || format!("workflow '{}' already exists", definition.name)))?;

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_by_id(
        &self,
        id: &DefinitionId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(decode).transpose()
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(decode).collect()
    }

    async fn set_active(
        &self,
        id: &DefinitionId,
        is_active: bool,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let result = sqlx::query("UPDATE workflows SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn delete_unreferenced(
        &self,
        id: &DefinitionId,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM request_instances
             WHERE workflow_id = ? AND status NOT IN ('COMPLETED', 'REJECTED')",
        )
        .bind(id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(query_err)?;

        if open > 0 {
            return Err(RepositoryError::Conflict(format!(
                "workflow is referenced by {open} open request(s)"
            )));
        }

        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM workflows")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }
}
