//! In-memory repository fakes and fixtures for engine and service tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::json;

use signoff_types::audit::AuditLogEntry;
use signoff_types::definition::{StepDefinition, TransitionRule, WorkflowDefinition};
use signoff_types::directory::{Actor, Permission, Role, User};
use signoff_types::error::RepositoryError;
use signoff_types::id::{DefinitionId, InstanceId, PermissionId, RoleId, UserId};
use signoff_types::instance::{InstanceStatus, RequestInstance, SlaBreach};

use crate::engine::transition::initial_instance;
use crate::repository::audit::AuditRepository;
use crate::repository::definition::DefinitionRepository;
use crate::repository::directory::DirectoryRepository;
use crate::repository::instance::{InstanceFilter, InstanceRepository};

#[derive(Default)]
struct State {
    definitions: Vec<WorkflowDefinition>,
    instances: HashMap<InstanceId, RequestInstance>,
    audit: Vec<AuditLogEntry>,
    breaches: Vec<SlaBreach>,
    permissions: Vec<Permission>,
    roles: Vec<Role>,
    users: Vec<User>,
    tokens: HashMap<String, UserId>,
}

/// One shared store implementing every repository trait.
///
/// Clones share state, so the same store can be handed to several services.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.lock().audit.clone()
    }

    pub fn breaches(&self) -> Vec<SlaBreach> {
        self.lock().breaches.clone()
    }

    /// Overwrite an instance without any checks.
    pub fn put_instance(&self, instance: RequestInstance) {
        self.lock().instances.insert(instance.id, instance);
    }
}

impl DefinitionRepository for InMemoryStore {
    async fn create(
        &self,
        definition: &WorkflowDefinition,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.definitions.iter().any(|d| d.name == definition.name) {
            return Err(RepositoryError::Conflict(format!(
                "workflow '{}' already exists",
                definition.name
            )));
        }
        state.definitions.push(definition.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn get_by_id(
        &self,
        id: &DefinitionId,
    ) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.lock().definitions.iter().find(|d| d.id == *id).cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut all = self.lock().definitions.clone();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn set_active(
        &self,
        id: &DefinitionId,
        is_active: bool,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let definition = state
            .definitions
            .iter_mut()
            .find(|d| d.id == *id)
            .ok_or(RepositoryError::NotFound)?;
        definition.is_active = is_active;
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn delete_unreferenced(
        &self,
        id: &DefinitionId,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if !state.definitions.iter().any(|d| d.id == *id) {
            return Err(RepositoryError::NotFound);
        }
        if state
            .instances
            .values()
            .any(|i| i.definition_id == *id && !i.status.is_terminal())
        {
            return Err(RepositoryError::Conflict(
                "workflow is referenced by open requests".to_string(),
            ));
        }
        state.definitions.retain(|d| d.id != *id);
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.lock().definitions.len() as u64)
    }
}

impl InstanceRepository for InMemoryStore {
    async fn insert(
        &self,
        instance: &RequestInstance,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        match state.definitions.iter().find(|d| d.id == instance.definition_id) {
            None => return Err(RepositoryError::NotFound),
            Some(d) if !d.is_active => {
                return Err(RepositoryError::Conflict("workflow is inactive".to_string()));
            }
            Some(_) => {}
        }
        state.instances.insert(instance.id, instance.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &InstanceId) -> Result<Option<RequestInstance>, RepositoryError> {
        // Suspend like a real read so concurrent callers interleave.
        tokio::task::yield_now().await;
        Ok(self.lock().instances.get(id).cloned())
    }

    async fn list(&self, filter: &InstanceFilter) -> Result<Vec<RequestInstance>, RepositoryError> {
        let mut matching: Vec<RequestInstance> = self
            .lock()
            .instances
            .values()
            .filter(|i| filter.status.is_none_or(|s| i.status == s))
            .filter(|i| filter.requester_id.is_none_or(|r| i.requester_id == r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.unwrap_or(i64::MAX).max(0) as usize;
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_open(&self) -> Result<Vec<RequestInstance>, RepositoryError> {
        let mut open: Vec<RequestInstance> = self
            .lock()
            .instances
            .values()
            .filter(|i| !i.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(open)
    }

    async fn save_transition(
        &self,
        instance: &RequestInstance,
        expected_version: i64,
        audit: &AuditLogEntry,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let stored = state
            .instances
            .get(&instance.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict("stale instance state".to_string()));
        }
        state.instances.insert(instance.id, instance.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn record_breach(
        &self,
        breach: &SlaBreach,
        audit: &AuditLogEntry,
        escalated: Option<(&RequestInstance, i64)>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        if state
            .breaches
            .iter()
            .any(|b| b.instance_id == breach.instance_id && b.step_index == breach.step_index)
        {
            return Ok(false);
        }
        if let Some((instance, expected_version)) = escalated {
            let stored = state
                .instances
                .get(&instance.id)
                .ok_or(RepositoryError::NotFound)?;
            if stored.version != expected_version {
                return Err(RepositoryError::Conflict("stale instance state".to_string()));
            }
            state.instances.insert(instance.id, instance.clone());
        }
        state.breaches.push(breach.clone());
        state.audit.push(audit.clone());
        Ok(true)
    }

    async fn count_by_status(&self) -> Result<Vec<(InstanceStatus, u64)>, RepositoryError> {
        let mut counts: HashMap<InstanceStatus, u64> = HashMap::new();
        for instance in self.lock().instances.values() {
            *counts.entry(instance.status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn count_breaches(&self) -> Result<u64, RepositoryError> {
        Ok(self.lock().breaches.len() as u64)
    }
}

impl AuditRepository for InMemoryStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), RepositoryError> {
        self.lock().audit.push(entry.clone());
        Ok(())
    }

    async fn list_for_instance(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        Ok(self
            .lock()
            .audit
            .iter()
            .filter(|e| e.instance_id == Some(*instance_id))
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        Ok(self
            .lock()
            .audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

impl DirectoryRepository for InMemoryStore {
    async fn create_permission(&self, permission: &Permission) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.permissions.iter().any(|p| p.name == permission.name) {
            return Err(RepositoryError::Conflict(format!(
                "permission '{}' already exists",
                permission.name
            )));
        }
        state.permissions.push(permission.clone());
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, RepositoryError> {
        Ok(self.lock().permissions.clone())
    }

    async fn get_permission_by_name(&self, name: &str) -> Result<Option<Permission>, RepositoryError> {
        Ok(self.lock().permissions.iter().find(|p| p.name == name).cloned())
    }

    async fn create_role(&self, role: &Role) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.roles.iter().any(|r| r.name == role.name) {
            return Err(RepositoryError::Conflict(format!(
                "role '{}' already exists",
                role.name
            )));
        }
        state.roles.push(role.clone());
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, RepositoryError> {
        Ok(self.lock().roles.clone())
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, RepositoryError> {
        Ok(self.lock().roles.iter().find(|r| r.name == name).cloned())
    }

    async fn grant_permission(
        &self,
        role_id: &RoleId,
        permission_id: &PermissionId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let role = state
            .roles
            .iter_mut()
            .find(|r| r.id == *role_id)
            .ok_or(RepositoryError::NotFound)?;
        if !role.permission_ids.contains(permission_id) {
            role.permission_ids.push(*permission_id);
        }
        Ok(())
    }

    async fn create_user(&self, user: &User) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict(format!(
                "user '{}' already exists",
                user.username
            )));
        }
        state.users.push(user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.lock().users.clone())
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.iter().find(|u| u.id == *id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock().users.iter().find(|u| u.username == username).cloned())
    }

    async fn assign_role(&self, user_id: &UserId, role_id: &RoleId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == *user_id)
            .ok_or(RepositoryError::NotFound)?;
        if !user.role_ids.contains(role_id) {
            user.role_ids.push(*role_id);
        }
        Ok(())
    }

    async fn permissions_for_roles(
        &self,
        role_ids: &[RoleId],
    ) -> Result<Vec<PermissionId>, RepositoryError> {
        let mut out: Vec<PermissionId> = Vec::new();
        for role in self.lock().roles.iter().filter(|r| role_ids.contains(&r.id)) {
            for permission in &role.permission_ids {
                if !out.contains(permission) {
                    out.push(*permission);
                }
            }
        }
        Ok(out)
    }

    async fn store_token(
        &self,
        user_id: &UserId,
        token_hash: &str,
        _label: &str,
    ) -> Result<(), RepositoryError> {
        self.lock().tokens.insert(token_hash.to_string(), *user_id);
        Ok(())
    }

    async fn find_user_by_token_hash(&self, token_hash: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.lock();
        let Some(user_id) = state.tokens.get(token_hash) else {
            return Ok(None);
        };
        Ok(state
            .users
            .iter()
            .find(|u| u.id == *user_id && u.is_active)
            .cloned())
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        Ok(self.lock().users.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn step(order: u32, name: &str, role: Option<RoleId>, sla_hours: u32) -> StepDefinition {
    StepDefinition {
        step_order: order,
        name: name.to_string(),
        description: None,
        required_role_id: role,
        required_permission_id: None,
        sla_hours,
        is_conditional: false,
    }
}

pub fn rule(from: u32, outcome: &str, to: Option<u32>) -> TransitionRule {
    TransitionRule {
        from_step_order: from,
        outcome: outcome.to_string(),
        to_step_order: to,
        condition: None,
        final_status: None,
    }
}

/// Manager approval (24h) followed by finance approval (48h).
pub fn scenario_definition(manager: RoleId, finance: RoleId) -> WorkflowDefinition {
    WorkflowDefinition {
        id: DefinitionId::new(),
        name: "Expense claim".to_string(),
        description: Some("Two-level approval".to_string()),
        is_active: true,
        steps: vec![
            step(1, "Manager approval", Some(manager), 24),
            step(2, "Finance approval", Some(finance), 48),
        ],
        transitions: vec![
            rule(1, "APPROVED", Some(2)),
            rule(1, "REJECTED", None),
            rule(2, "APPROVED", None),
            rule(2, "REJECTED", None),
        ],
        created_by: None,
        created_at: Utc::now(),
    }
}

pub fn instance_for(definition: &WorkflowDefinition, now: DateTime<Utc>) -> RequestInstance {
    initial_instance(definition, UserId::new(), json!({"amount": 420}), now)
        .expect("fixture definition has a step 1")
}

pub fn actor_with_roles(role_ids: Vec<RoleId>) -> Actor {
    Actor {
        user_id: UserId::new(),
        username: "tester".to_string(),
        role_ids,
        permission_ids: Vec::new(),
        is_admin: false,
    }
}
