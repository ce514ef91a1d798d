//! SQLite request instance repository.
//!
//! The frozen workflow snapshot and the materialized steps live in JSON
//! columns. Every state change is a version-checked UPDATE so two writers
//! that loaded the same version cannot both succeed.

use signoff_core::repository::instance::{InstanceFilter, InstanceRepository};
use signoff_types::audit::AuditLogEntry;
use signoff_types::error::RepositoryError;
use signoff_types::id::InstanceId;
use signoff_types::instance::{InstanceStatus, RequestInstance, SlaBreach};
use sqlx::{Row, SqliteConnection};

use super::audit::insert_audit;
use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_id, query_err, to_json};

pub struct SqliteInstanceRepository {
    pool: DatabasePool,
}

impl SqliteInstanceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct InstanceRow {
    id: String,
    workflow_id: String,
    workflow_name: String,
    requester_id: String,
    payload: String,
    status: String,
    version: i64,
    snapshot: String,
    steps: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl InstanceRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_name: row.try_get("workflow_name")?,
            requester_id: row.try_get("requester_id")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            version: row.try_get("version")?,
            snapshot: row.try_get("snapshot")?,
            steps: row.try_get("steps")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_instance(self) -> Result<RequestInstance, RepositoryError> {
        Ok(RequestInstance {
            id: parse_id("request", &self.id)?,
            definition_id: parse_id("workflow", &self.workflow_id)?,
            workflow_name: self.workflow_name,
            requester_id: parse_id("user", &self.requester_id)?,
            payload: from_json("payload", &self.payload)?,
            status: self
                .status
                .parse::<InstanceStatus>()
                .map_err(RepositoryError::Query)?,
            version: self.version,
            snapshot: from_json("snapshot", &self.snapshot)?,
            steps: from_json("steps", &self.steps)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<RequestInstance, RepositoryError> {
    InstanceRow::from_row(row).map_err(query_err)?.into_instance()
}

/// Version-checked update of the mutable instance columns.
async fn update_checked(
    conn: &mut SqliteConnection,
    instance: &RequestInstance,
    expected_version: i64,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE request_instances
         SET status = ?, version = ?, steps = ?, updated_at = ?, completed_at = ?
         WHERE id = ? AND version = ?",
    )
    .bind(instance.status.as_str())
    .bind(instance.version)
    .bind(to_json(&instance.steps)?)
    .bind(format_datetime(&instance.updated_at))
    .bind(instance.completed_at.as_ref().map(format_datetime))
    .bind(instance.id.to_string())
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(query_err)?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict("stale instance state".to_string()));
    }
    Ok(())
}

impl InstanceRepository for SqliteInstanceRepository {
    async fn insert(
        &self,
        instance: &RequestInstance,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let inserted = sqlx::query(
            "INSERT INTO request_instances
             (id, workflow_id, workflow_name, requester_id, payload, status, version, snapshot, steps, created_at, updated_at, completed_at)
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM workflows WHERE id = ? AND is_active = 1)",
        )
        .bind(instance.id.to_string())
        .bind(instance.definition_id.to_string())
        .bind(&instance.workflow_name)
        .bind(instance.requester_id.to_string())
        .bind(to_json(&instance.payload)?)
        .bind(instance.status.as_str())
        .bind(instance.version)
        .bind(to_json(&instance.snapshot)?)
        .bind(to_json(&instance.steps)?)
        .bind(format_datetime(&instance.created_at))
        .bind(format_datetime(&instance.updated_at))
        .bind(instance.completed_at.as_ref().map(format_datetime))
        .bind(instance.definition_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if inserted.rows_affected() == 0 {
            let is_active: Option<bool> =
                sqlx::query_scalar("SELECT is_active FROM workflows WHERE id = ?")
                    .bind(instance.definition_id.to_string())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(query_err)?;
            return Err(match is_active {
                None => RepositoryError::NotFound,
                Some(_) => RepositoryError::Conflict(format!(
                    "workflow {} is inactive",
                    instance.definition_id
                )),
            });
        }

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn get_by_id(&self, id: &InstanceId) -> Result<Option<RequestInstance>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM request_instances WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(decode).transpose()
    }

    async fn list(&self, filter: &InstanceFilter) -> Result<Vec<RequestInstance>, RepositoryError> {
        let mut sql = String::from("SELECT * FROM request_instances");
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            binds.push(status.as_str().to_string());
        }
        if let Some(requester) = filter.requester_id {
            conditions.push("requester_id = ?");
            binds.push(requester.to_string());
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = filter.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool.reader).await.map_err(query_err)?;

        rows.iter().map(decode).collect()
    }

    async fn list_open(&self) -> Result<Vec<RequestInstance>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM request_instances
             WHERE status IN ('IN_PROGRESS', 'ESCALATED')
             ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(decode).collect()
    }

    async fn save_transition(
        &self,
        instance: &RequestInstance,
        expected_version: i64,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        update_checked(&mut *tx, instance, expected_version).await?;
        insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn record_breach(
        &self,
        breach: &SlaBreach,
        audit: &AuditLogEntry,
        escalated: Option<(&RequestInstance, i64)>,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO sla_escalations (instance_id, step_index, step_order, deadline, detected_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(breach.instance_id.to_string())
        .bind(breach.step_index)
        .bind(breach.step_order)
        .bind(format_datetime(&breach.deadline))
        .bind(format_datetime(&breach.detected_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.map_err(query_err)?;
            return Ok(false);
        }

        if let Some((instance, expected_version)) = escalated {
            update_checked(&mut *tx, instance, expected_version).await?;
        }

        insert_audit(&mut *tx, audit).await?;
        tx.commit().await.map_err(query_err)?;
        Ok(true)
    }

    async fn count_by_status(&self) -> Result<Vec<(InstanceStatus, u64)>, RepositoryError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM request_instances GROUP BY status")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in &rows {
            let status: String = row.try_get("status").map_err(query_err)?;
            let n: i64 = row.try_get("n").map_err(query_err)?;
            let status = status.parse::<InstanceStatus>().map_err(RepositoryError::Query)?;
            counts.push((status, n as u64));
        }
        Ok(counts)
    }

    async fn count_breaches(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sla_escalations")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(query_err)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::audit::SqliteAuditRepository;
    use crate::sqlite::test_pool;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use signoff_core::repository::audit::AuditRepository;
    use signoff_types::audit::AuditAction;
    use signoff_types::definition::{StepDefinition, TransitionRule, WorkflowSnapshot};
    use signoff_types::id::{DefinitionId, UserId};
    use signoff_types::instance::{RequestStepState, StepStatus};

    fn make_instance(definition_id: DefinitionId, requester: UserId) -> RequestInstance {
        let now = Utc::now();
        RequestInstance {
            id: InstanceId::new(),
            definition_id,
            workflow_name: "Expense claim".to_string(),
            requester_id: requester,
            payload: json!({"amount": 420, "currency": "EUR"}),
            status: InstanceStatus::InProgress,
            version: 1,
            snapshot: WorkflowSnapshot {
                steps: vec![StepDefinition {
                    step_order: 1,
                    name: "Manager approval".to_string(),
                    description: None,
                    required_role_id: None,
                    required_permission_id: None,
                    sla_hours: 24,
                    is_conditional: false,
                }],
                transitions: vec![TransitionRule {
                    from_step_order: 1,
                    outcome: "APPROVED".to_string(),
                    to_step_order: None,
                    condition: None,
                    final_status: None,
                }],
            },
            steps: vec![RequestStepState {
                step_order: 1,
                step_name: "Manager approval".to_string(),
                status: StepStatus::Pending,
                started_at: now,
                deadline: Some(now + Duration::hours(24)),
                completed_at: None,
                outcome: None,
                note: None,
                acted_by: None,
            }],
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn audit_for(action: AuditAction, instance: &RequestInstance) -> AuditLogEntry {
        AuditLogEntry::new(action, "request", instance.id, None, Utc::now()).for_instance(instance.id)
    }

    async fn insert_workflow(pool: &DatabasePool, is_active: bool) -> DefinitionId {
        let id = DefinitionId::new();
        sqlx::query(
            "INSERT INTO workflows (id, name, is_active, steps, transitions, created_at)
             VALUES (?, ?, ?, '[]', '[]', ?)",
        )
        .bind(id.to_string())
        .bind(format!("Workflow {id}"))
        .bind(is_active)
        .bind(format_datetime(&Utc::now()))
        .execute(&pool.writer)
        .await
        .unwrap();
        id
    }

    async fn seeded() -> (DatabasePool, SqliteInstanceRepository, RequestInstance) {
        let pool = test_pool().await;
        let repo = SqliteInstanceRepository::new(pool.clone());
        let workflow_id = insert_workflow(&pool, true).await;
        let instance = make_instance(workflow_id, UserId::new());
        repo.insert(&instance, &audit_for(AuditAction::InstanceStarted, &instance))
            .await
            .unwrap();
        (pool, repo, instance)
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (_, repo, instance) = seeded().await;
        let loaded = repo.get_by_id(&instance.id).await.unwrap().unwrap();
        assert_eq!(loaded, instance);
        assert!(repo.get_by_id(&InstanceId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_requires_active_workflow() {
        let (pool, repo, _) = seeded().await;

        let orphan = make_instance(DefinitionId::new(), UserId::new());
        let err = repo
            .insert(&orphan, &audit_for(AuditAction::InstanceStarted, &orphan))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));

        let inactive = make_instance(insert_workflow(&pool, false).await, UserId::new());
        let err = repo
            .insert(&inactive, &audit_for(AuditAction::InstanceStarted, &inactive))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        assert!(repo.get_by_id(&orphan.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&inactive.id).await.unwrap().is_none());
        let audit = SqliteAuditRepository::new(pool)
            .list_for_instance(&inactive.id)
            .await
            .unwrap();
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn test_save_transition_rejects_stale_version() {
        let (pool, repo, instance) = seeded().await;

        let mut next = instance.clone();
        next.version = 2;
        next.status = InstanceStatus::Completed;
        next.steps[0].status = StepStatus::Approved;
        next.completed_at = Some(Utc::now());
        repo.save_transition(&next, 1, &audit_for(AuditAction::StepDecided, &next))
            .await
            .unwrap();

        // A second writer that also loaded version 1 must lose.
        let mut racer = instance.clone();
        racer.version = 2;
        racer.status = InstanceStatus::Rejected;
        let err = repo
            .save_transition(&racer, 1, &audit_for(AuditAction::StepDecided, &racer))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let stored = repo.get_by_id(&instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Completed);
        assert_eq!(stored.version, 2);

        let audit = SqliteAuditRepository::new(pool)
            .list_for_instance(&instance.id)
            .await
            .unwrap();
        let actions: Vec<AuditAction> = audit.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::InstanceStarted, AuditAction::StepDecided]);
    }

    #[tokio::test]
    async fn test_list_filters_and_open_instances() {
        let (_, repo, first) = seeded().await;
        let other = make_instance(first.definition_id, UserId::new());
        let mut done = other.clone();
        repo.insert(&other, &audit_for(AuditAction::InstanceStarted, &other))
            .await
            .unwrap();
        done.version = 2;
        done.status = InstanceStatus::Rejected;
        repo.save_transition(&done, 1, &audit_for(AuditAction::StepDecided, &done))
            .await
            .unwrap();

        let by_requester = repo
            .list(&InstanceFilter {
                requester_id: Some(first.requester_id),
                ..InstanceFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_requester.len(), 1);
        assert_eq!(by_requester[0].id, first.id);

        let rejected = repo
            .list(&InstanceFilter {
                status: Some(InstanceStatus::Rejected),
                limit: Some(10),
                ..InstanceFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id, other.id);

        let open = repo.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first.id);

        let mut counts = repo.count_by_status().await.unwrap();
        counts.sort_by_key(|(status, _)| status.as_str());
        assert_eq!(
            counts,
            vec![(InstanceStatus::InProgress, 1), (InstanceStatus::Rejected, 1)]
        );
    }

    #[tokio::test]
    async fn test_breach_is_recorded_once_per_step_index() {
        let (pool, repo, instance) = seeded().await;
        let deadline = instance.steps[0].deadline.unwrap();
        let breach = SlaBreach {
            instance_id: instance.id,
            step_index: 0,
            step_order: 1,
            deadline,
            detected_at: deadline + Duration::minutes(5),
        };

        let mut escalated = instance.clone();
        escalated.status = InstanceStatus::Escalated;
        escalated.version = 2;

        let first = repo
            .record_breach(
                &breach,
                &audit_for(AuditAction::SlaBreachDetected, &instance),
                Some((&escalated, 1)),
            )
            .await
            .unwrap();
        let second = repo
            .record_breach(&breach, &audit_for(AuditAction::SlaBreachDetected, &instance), None)
            .await
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(repo.count_breaches().await.unwrap(), 1);

        let stored = repo.get_by_id(&instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Escalated);
        assert_eq!(stored.version, 2);

        let audit = SqliteAuditRepository::new(pool)
            .list_for_instance(&instance.id)
            .await
            .unwrap();
        assert_eq!(audit.len(), 2);
    }

    #[tokio::test]
    async fn test_breach_with_stale_escalation_writes_nothing() {
        let (_, repo, instance) = seeded().await;
        let breach = SlaBreach {
            instance_id: instance.id,
            step_index: 0,
            step_order: 1,
            deadline: Utc::now(),
            detected_at: Utc::now(),
        };
        let mut escalated = instance.clone();
        escalated.status = InstanceStatus::Escalated;
        escalated.version = 6;

        let err = repo
            .record_breach(
                &breach,
                &audit_for(AuditAction::SlaBreachDetected, &instance),
                Some((&escalated, 5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(repo.count_breaches().await.unwrap(), 0);
    }
}
