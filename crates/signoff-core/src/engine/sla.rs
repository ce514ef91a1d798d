//! Periodic SLA breach sweep.
//!
//! Breach status is always derived at read time; the sweep only records
//! each breach once (escalation record + `SLA_BREACH_DETECTED` audit entry)
//! and publishes an event for notification. Step status is never changed.
//! With `escalate_instances` enabled the instance is additionally flagged
//! `ESCALATED` until its current step is decided.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use signoff_types::audit::{AuditAction, AuditLogEntry};
use signoff_types::error::{EngineError, RepositoryError};
use signoff_types::event::WorkflowEvent;
use signoff_types::instance::{InstanceStatus, RequestInstance, SlaBreach};

use crate::clock::Clock;
use crate::event::EventBus;
use crate::repository::instance::InstanceRepository;

/// Result of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub breaches: usize,
    pub escalated: usize,
}

pub struct SlaSweeper<I: InstanceRepository> {
    instances: I,
    clock: Arc<dyn Clock>,
    events: EventBus,
    escalate_instances: bool,
}

impl<I: InstanceRepository> SlaSweeper<I> {
    pub fn new(
        instances: I,
        clock: Arc<dyn Clock>,
        events: EventBus,
        escalate_instances: bool,
    ) -> Self {
        Self {
            instances,
            clock,
            events,
            escalate_instances,
        }
    }

    /// Scan every open instance once and record new breaches.
    pub async fn sweep_once(&self) -> Result<SweepReport, EngineError> {
        let open = self.instances.list_open().await?;
        let now = self.clock.now();
        let mut report = SweepReport {
            scanned: open.len(),
            ..SweepReport::default()
        };

        for instance in &open {
            for (index, state) in instance.steps.iter().enumerate() {
                if !state.is_sla_breached(now) {
                    continue;
                }
                let Some(deadline) = state.deadline else {
                    continue;
                };

                let breach = SlaBreach {
                    instance_id: instance.id,
                    step_index: index as u32,
                    step_order: state.step_order,
                    deadline,
                    detected_at: now,
                };
                let audit = AuditLogEntry::new(
                    AuditAction::SlaBreachDetected,
                    "request",
                    instance.id,
                    None,
                    now,
                )
                .for_instance(instance.id)
                .with_details(json!({
                    "step_index": index,
                    "step_order": state.step_order,
                    "step_name": state.step_name,
                    "deadline": deadline,
                    "overdue_minutes": (now - deadline).num_minutes(),
                }));

                let escalated = self.escalated_copy(instance, now);
                let escalation = escalated.as_ref().map(|e| (e, instance.version));

                match self.instances.record_breach(&breach, &audit, escalation).await {
                    Ok(true) => {
                        report.breaches += 1;
                        if escalated.is_some() {
                            report.escalated += 1;
                        }
                        tracing::warn!(
                            request_id = %instance.id,
                            step_order = state.step_order,
                            %deadline,
                            "SLA breach detected"
                        );
                        self.events.publish(WorkflowEvent::SlaBreached {
                            instance_id: instance.id,
                            workflow_name: instance.workflow_name.clone(),
                            step_order: state.step_order,
                            step_name: state.step_name.clone(),
                            deadline,
                        });
                    }
                    Ok(false) => {}
                    Err(RepositoryError::Conflict(_)) => {
                        // The instance moved on since it was listed.
                        tracing::debug!(request_id = %instance.id, "skipping breach on stale instance");
                    }
                    Err(e) => {
                        tracing::warn!(request_id = %instance.id, "failed to record SLA breach: {e}");
                    }
                }
            }
        }

        Ok(report)
    }

    fn escalated_copy(
        &self,
        instance: &RequestInstance,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<RequestInstance> {
        if !self.escalate_instances || instance.status != InstanceStatus::InProgress {
            return None;
        }
        let mut escalated = instance.clone();
        escalated.status = InstanceStatus::Escalated;
        escalated.version = instance.version + 1;
        escalated.updated_at = now;
        Some(escalated)
    }

    /// Sweep every `period` until `cancel` fires.
    pub async fn run(&self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.breaches > 0 => {
                            tracing::info!(
                                scanned = report.scanned,
                                breaches = report.breaches,
                                escalated = report.escalated,
                                "SLA sweep complete"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("SLA sweep failed: {e}"),
                    }
                }
            }
        }

        tracing::debug!("SLA sweep stopped");
    }
}
