//! Step executor: applies a decision to the current step of an instance.
//!
//! One decision per instance may be in flight in this process; a second
//! concurrent call is refused rather than queued. The repository's version
//! check covers writers in other processes. A call either persists the full
//! transition with its audit entry or nothing.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use signoff_types::directory::Actor;
use signoff_types::error::{EngineError, RepositoryError};
use signoff_types::id::InstanceId;
use signoff_types::instance::RequestInstance;

use crate::clock::Clock;
use crate::engine::transition::{Decision, apply_decision};
use crate::event::EventBus;
use crate::repository::instance::InstanceRepository;

pub struct StepExecutor<I: InstanceRepository> {
    instances: I,
    clock: Arc<dyn Clock>,
    events: EventBus,
    locks: DashMap<InstanceId, Arc<Mutex<()>>>,
}

impl<I: InstanceRepository> StepExecutor<I> {
    pub fn new(instances: I, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            instances,
            clock,
            events,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: &InstanceId) -> Arc<Mutex<()>> {
        self.locks.entry(*id).or_default().clone()
    }

    async fn load(&self, instance_id: &InstanceId) -> Result<RequestInstance, EngineError> {
        self.instances
            .get_by_id(instance_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {instance_id}")))
    }

    /// Apply `decision` to the current pending step of `instance_id`.
    ///
    /// The decision is bound to the version the caller names, or to the
    /// version stored when the call arrives. A call that finds another
    /// decision in flight, or the instance moved past that version, gets
    /// `Conflict("stale instance state")` and should reload and retry.
    pub async fn process(
        &self,
        instance_id: &InstanceId,
        actor: &Actor,
        decision: Decision,
    ) -> Result<RequestInstance, EngineError> {
        let observed = match decision.expected_version {
            Some(version) => version,
            None => self.load(instance_id).await?.version,
        };

        let lock = self.lock_for(instance_id);
        let result = match lock.try_lock() {
            Ok(_guard) => self.decide(instance_id, actor, &decision, observed).await,
            Err(_) => Err(EngineError::stale()),
        };

        drop(lock);
        self.locks
            .remove_if(instance_id, |_, entry| Arc::strong_count(entry) == 1);
        result
    }

    async fn decide(
        &self,
        instance_id: &InstanceId,
        actor: &Actor,
        decision: &Decision,
        observed: i64,
    ) -> Result<RequestInstance, EngineError> {
        let current = self.load(instance_id).await?;
        if current.version != observed {
            return Err(EngineError::stale());
        }

        let applied = apply_decision(&current, actor, decision, self.clock.now())?;

        self.instances
            .save_transition(&applied.instance, current.version, &applied.audit)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => EngineError::stale(),
                other => other.into(),
            })?;

        tracing::info!(
            request_id = %instance_id,
            actor = %actor.username,
            outcome = %decision.outcome.trim(),
            status = %applied.instance.status,
            version = applied.instance.version,
            "step decided"
        );

        for event in applied.events {
            self.events.publish(event);
        }

        Ok(applied.instance)
    }
}
