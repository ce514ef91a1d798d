//! Task queries: the pending steps an actor may decide, and dashboard counts.
//!
//! Everything here is computed fresh from open instances on each call.

use std::sync::Arc;

use signoff_types::directory::Actor;
use signoff_types::error::EngineError;
use signoff_types::instance::{DashboardStats, InstanceStatus, TaskView};

use crate::clock::Clock;
use crate::repository::instance::InstanceRepository;
use crate::workflow::authorize::check_gate;

pub struct TaskQueryService<I: InstanceRepository> {
    instances: I,
    clock: Arc<dyn Clock>,
}

impl<I: InstanceRepository> TaskQueryService<I> {
    pub fn new(instances: I, clock: Arc<dyn Clock>) -> Self {
        Self { instances, clock }
    }

    /// Pending steps `actor` is allowed to decide, earliest deadline first.
    /// Steps without a deadline sort last.
    pub async fn my_tasks(&self, actor: &Actor) -> Result<Vec<TaskView>, EngineError> {
        let now = self.clock.now();
        let open = self.instances.list_open().await?;

        let mut tasks: Vec<TaskView> = open
            .iter()
            .filter_map(|instance| {
                let state = instance.current_step()?;
                let step = instance.snapshot.step(state.step_order)?;
                if !check_gate(step, actor).is_allowed() {
                    return None;
                }
                Some(TaskView {
                    request_id: instance.id,
                    workflow_name: instance.workflow_name.clone(),
                    step_order: state.step_order,
                    step_name: state.step_name.clone(),
                    step_description: step.description.clone(),
                    deadline: state.deadline,
                    is_sla_breached: state.is_sla_breached(now),
                    request_data: instance.payload.clone(),
                    created_at: instance.created_at,
                })
            })
            .collect();

        tasks.sort_by(|a, b| match (a.deadline, b.deadline) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.created_at.cmp(&b.created_at),
        });

        tracing::debug!(actor = %actor.username, count = tasks.len(), "computed task list");
        Ok(tasks)
    }

    pub async fn stats(&self) -> Result<DashboardStats, EngineError> {
        let now = self.clock.now();
        let mut stats = DashboardStats::default();

        for (status, count) in self.instances.count_by_status().await? {
            match status {
                InstanceStatus::InProgress => stats.active += count,
                InstanceStatus::Escalated => {
                    stats.active += count;
                    stats.escalated += count;
                }
                InstanceStatus::Completed => stats.completed += count,
                InstanceStatus::Rejected => stats.rejected += count,
                InstanceStatus::Created => {}
            }
        }

        for instance in self.instances.list_open().await? {
            for state in instance.steps.iter().filter(|s| s.status.is_pending()) {
                stats.pending += 1;
                if state.is_sla_breached(now) {
                    stats.overdue += 1;
                }
            }
        }

        Ok(stats)
    }
}
