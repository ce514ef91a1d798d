//! Workflow definition store.
//!
//! Definitions are validated once at creation and never edited afterwards;
//! the only mutation is toggling availability for new requests. Writes are
//! serialized per definition id, reads are unrestricted.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;

use signoff_types::audit::{AuditAction, AuditLogEntry};
use signoff_types::definition::{CreateDefinitionRequest, WorkflowDefinition};
use signoff_types::error::{EngineError, RepositoryError};
use signoff_types::id::{DefinitionId, UserId};

use crate::clock::Clock;
use crate::repository::definition::DefinitionRepository;
use crate::workflow::definition::{normalize_definition, validate_definition};

pub struct DefinitionStore<D: DefinitionRepository> {
    repo: D,
    clock: Arc<dyn Clock>,
    write_locks: DashMap<DefinitionId, Arc<Mutex<()>>>,
}

fn not_found(id: &DefinitionId) -> EngineError {
    EngineError::NotFound(format!("workflow {id}"))
}

impl<D: DefinitionRepository> DefinitionStore<D> {
    pub fn new(repo: D, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            write_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: &DefinitionId) -> Arc<Mutex<()>> {
        self.write_locks.entry(*id).or_default().clone()
    }

    /// Validate and persist a new definition.
    pub async fn create(
        &self,
        mut request: CreateDefinitionRequest,
        created_by: Option<UserId>,
    ) -> Result<WorkflowDefinition, EngineError> {
        normalize_definition(&mut request);
        validate_definition(&request)?;

        let now = self.clock.now();
        let mut steps = request.steps;
        steps.sort_by_key(|s| s.step_order);

        let definition = WorkflowDefinition {
            id: DefinitionId::new(),
            name: request.name,
            description: request.description,
            is_active: request.is_active.unwrap_or(true),
            steps,
            transitions: request.transitions,
            created_by,
            created_at: now,
        };

        let audit = AuditLogEntry::new(
            AuditAction::DefinitionCreated,
            "workflow",
            definition.id,
            created_by,
            now,
        )
        .with_details(json!({
            "name": definition.name,
            "steps": definition.steps.len(),
            "transitions": definition.transitions.len(),
        }));

        self.repo.create(&definition, &audit).await?;
        tracing::info!(workflow_id = %definition.id, name = %definition.name, "workflow created");
        Ok(definition)
    }

    pub async fn get(&self, id: &DefinitionId) -> Result<WorkflowDefinition, EngineError> {
        self.repo.get_by_id(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn list(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
        Ok(self.repo.list().await?)
    }

    pub async fn count(&self) -> Result<u64, EngineError> {
        Ok(self.repo.count().await?)
    }

    /// Enable or disable new requests against a definition.
    ///
    /// In-flight instances run on their own snapshot and are unaffected.
    pub async fn set_active(
        &self,
        id: &DefinitionId,
        is_active: bool,
        actor: Option<UserId>,
    ) -> Result<WorkflowDefinition, EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let action = if is_active {
            AuditAction::DefinitionActivated
        } else {
            AuditAction::DefinitionDeactivated
        };
        let audit = AuditLogEntry::new(action, "workflow", id, actor, self.clock.now());

        self.repo
            .set_active(id, is_active, &audit)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => not_found(id),
                other => other.into(),
            })?;
        tracing::info!(workflow_id = %id, is_active, "workflow availability changed");
        self.get(id).await
    }

    /// Delete a definition no open request references.
    pub async fn delete(&self, id: &DefinitionId, actor: Option<UserId>) -> Result<(), EngineError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let audit =
            AuditLogEntry::new(AuditAction::DefinitionDeleted, "workflow", id, actor, self.clock.now());

        self.repo
            .delete_unreferenced(id, &audit)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => not_found(id),
                other => other.into(),
            })?;

        self.write_locks.remove(id);
        tracing::info!(workflow_id = %id, "workflow deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::repository::audit::AuditRepository;
    use crate::repository::instance::InstanceRepository;
    use crate::testing::{InMemoryStore, instance_for};
    use serde_json::json;
    use signoff_types::instance::InstanceStatus;

    fn store() -> (InMemoryStore, DefinitionStore<InMemoryStore>) {
        let repo = InMemoryStore::default();
        (repo.clone(), DefinitionStore::new(repo, Arc::new(SystemClock)))
    }

    fn request(name: &str) -> CreateDefinitionRequest {
        serde_json::from_value(json!({
            "name": name,
            "steps": [
                {"step_order": 2, "name": "Second"},
                {"step_order": 1, "name": "First", "sla_hours": 4}
            ],
            "transitions": [
                {"from_step_order": 1, "outcome": "APPROVED", "to_step_order": 2},
                {"from_step_order": 2, "outcome": "APPROVED", "to_step_order": null}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_sorts_steps_and_audits() {
        let (repo, store) = store();
        let def = store.create(request("  Onboarding "), None).await.unwrap();

        assert_eq!(def.name, "Onboarding");
        assert!(def.is_active);
        assert_eq!(def.steps[0].step_order, 1);
        assert_eq!(store.get(&def.id).await.unwrap().steps.len(), 2);

        let audit = repo.list_recent(10).await.unwrap();
        assert_eq!(audit[0].action, AuditAction::DefinitionCreated);
        assert_eq!(audit[0].resource_id, def.id.to_string());
    }

    #[tokio::test]
    async fn create_rejects_invalid_definition_without_writing() {
        let (repo, store) = store();
        let mut bad = request("Broken");
        bad.transitions.clear();

        let err = store.create(bad, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(store.list().await.unwrap().is_empty());
        assert!(repo.list_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stored_outcomes_are_trimmed() {
        let (_, store) = store();
        let mut req = request("Padded");
        req.transitions[1].outcome = " APPROVED ".to_string();

        let def = store.create(req, None).await.unwrap();
        let stored = store.get(&def.id).await.unwrap();
        assert_eq!(stored.transitions[1].outcome, "APPROVED");
        assert_eq!(stored.snapshot().rules_for(2, "APPROVED").count(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let (_, store) = store();
        store.create(request("Leave"), None).await.unwrap();
        let err = store.create(request("Leave"), None).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_refuses_referenced_definition() {
        let (repo, store) = store();
        let def = store.create(request("Travel"), None).await.unwrap();
        let instance = instance_for(&def, chrono::Utc::now());
        repo.put_instance(instance.clone());

        let err = store.delete(&def.id, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));

        // Once the request is finished the definition can go.
        let mut finished = instance;
        finished.status = InstanceStatus::Completed;
        repo.put_instance(finished);
        store.delete(&def.id, None).await.unwrap();
        assert!(matches!(store.get(&def.id).await, Err(EngineError::NotFound(_))));
        assert_eq!(repo.count_by_status().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_definition_is_not_found() {
        let (_, store) = store();
        let id = DefinitionId::new();
        assert!(matches!(store.delete(&id, None).await, Err(EngineError::NotFound(_))));
        assert!(matches!(
            store.set_active(&id, false, None).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deactivate_then_activate() {
        let (_, store) = store();
        let def = store.create(request("Hiring"), None).await.unwrap();
        assert!(!store.set_active(&def.id, false, None).await.unwrap().is_active);
        assert!(store.set_active(&def.id, true, None).await.unwrap().is_active);
    }
}
