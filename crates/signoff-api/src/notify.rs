//! Log-based notification sink for engine events.
//!
//! Stands in for mail or chat delivery: every `WorkflowEvent` published on
//! the bus is written as a structured `tracing` record under the
//! `signoff::notify` target.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use signoff_core::event::EventBus;
use signoff_types::event::WorkflowEvent;

/// Spawn the notifier on the current runtime.
pub fn spawn(events: &EventBus, cancel: CancellationToken) -> tokio::task::JoinHandle<usize> {
    let rx = events.subscribe();
    tokio::spawn(run(rx, cancel))
}

/// Drain events until the bus closes or `cancel` fires. Returns the number
/// of events delivered.
pub async fn run(mut rx: broadcast::Receiver<WorkflowEvent>, cancel: CancellationToken) -> usize {
    let mut delivered = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Ok(event) => {
                    deliver(&event);
                    delivered += 1;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "notifier lagged, skipping {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!(delivered, "notifier stopped");
    delivered
}

fn deliver(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::StepAssigned {
            instance_id,
            workflow_name,
            step_order,
            step_name,
            required_role_id,
            deadline,
            ..
        } => {
            tracing::info!(
                target: "signoff::notify",
                %instance_id,
                workflow = %workflow_name,
                step_order,
                role = ?required_role_id,
                deadline = ?deadline,
                "step '{step_name}' awaits a decision"
            );
        }
        WorkflowEvent::InstanceFinished {
            instance_id,
            workflow_name,
            status,
        } => {
            tracing::info!(
                target: "signoff::notify",
                %instance_id,
                workflow = %workflow_name,
                %status,
                "request finished"
            );
        }
        WorkflowEvent::SlaBreached {
            instance_id,
            workflow_name,
            step_order,
            step_name,
            deadline,
        } => {
            tracing::warn!(
                target: "signoff::notify",
                %instance_id,
                workflow = %workflow_name,
                step_order,
                %deadline,
                "step '{step_name}' breached its SLA"
            );
        }
    }
}
