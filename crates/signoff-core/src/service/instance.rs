//! Request instance manager: starting and reading instances.

use std::sync::Arc;

use serde_json::{Value, json};

use signoff_types::audit::{AuditAction, AuditLogEntry};
use signoff_types::error::{EngineError, RepositoryError};
use signoff_types::id::{DefinitionId, InstanceId, UserId};
use signoff_types::instance::RequestInstance;

use crate::clock::Clock;
use crate::engine::transition::{initial_instance, step_assigned};
use crate::event::EventBus;
use crate::repository::definition::DefinitionRepository;
use crate::repository::instance::{InstanceFilter, InstanceRepository};

/// Page size used when a list call gives no limit.
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

pub struct InstanceManager<D: DefinitionRepository, I: InstanceRepository> {
    definitions: D,
    instances: I,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl<D: DefinitionRepository, I: InstanceRepository> InstanceManager<D, I> {
    pub fn new(definitions: D, instances: I, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            definitions,
            instances,
            clock,
            events,
        }
    }

    /// Start a request against an active definition.
    ///
    /// The definition's steps and transitions are frozen onto the instance,
    /// so later changes to the definition never affect it.
    pub async fn start(
        &self,
        definition_id: &DefinitionId,
        requester_id: UserId,
        payload: Value,
    ) -> Result<RequestInstance, EngineError> {
        let definition = self
            .definitions
            .get_by_id(definition_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("workflow {definition_id}")))?;
        if !definition.is_active {
            return Err(EngineError::InactiveDefinition(definition.id));
        }

        let now = self.clock.now();
        let instance = initial_instance(&definition, requester_id, payload, now)?;

        let audit = AuditLogEntry::new(
            AuditAction::InstanceStarted,
            "request",
            instance.id,
            Some(requester_id),
            now,
        )
        .for_instance(instance.id)
        .with_details(json!({
            "workflow_id": definition.id,
            "workflow_name": definition.name,
        }));

        // The store re-checks the definition inside the insert, so a delete
        // or deactivation that lands after the read above still wins.
        self.instances
            .insert(&instance, &audit)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => {
                    EngineError::NotFound(format!("workflow {definition_id}"))
                }
                RepositoryError::Conflict(_) => EngineError::InactiveDefinition(definition.id),
                other => other.into(),
            })?;

        tracing::info!(
            request_id = %instance.id,
            workflow = %definition.name,
            requester = %requester_id,
            "request started"
        );
        if let Some(first) = instance.snapshot.step(1) {
            self.events.publish(step_assigned(&instance, first));
        }

        Ok(instance)
    }

    pub async fn get(&self, id: &InstanceId) -> Result<RequestInstance, EngineError> {
        self.instances
            .get_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {id}")))
    }

    pub async fn list(&self, mut filter: InstanceFilter) -> Result<Vec<RequestInstance>, EngineError> {
        filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT));
        filter.offset = Some(filter.offset.unwrap_or(0).max(0));
        Ok(self.instances.list(&filter).await?)
    }

    pub async fn count_breaches(&self) -> Result<u64, EngineError> {
        Ok(self.instances.count_breaches().await?)
    }
}
