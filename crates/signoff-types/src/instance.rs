//! Request instance types: one running execution of a workflow definition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::definition::WorkflowSnapshot;
use crate::id::{DefinitionId, InstanceId, UserId};

/// Overall lifecycle of a request instance.
///
/// `Created` is transient and never persisted. `Escalated` is an overlay on
/// an in-progress instance: the current step can still be processed, which
/// returns the instance to `InProgress` or a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Created,
    InProgress,
    Completed,
    Rejected,
    Escalated,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Created => "CREATED",
            InstanceStatus::InProgress => "IN_PROGRESS",
            InstanceStatus::Completed => "COMPLETED",
            InstanceStatus::Rejected => "REJECTED",
            InstanceStatus::Escalated => "ESCALATED",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATED" => Ok(InstanceStatus::Created),
            "IN_PROGRESS" => Ok(InstanceStatus::InProgress),
            "COMPLETED" => Ok(InstanceStatus::Completed),
            "REJECTED" => Ok(InstanceStatus::Rejected),
            "ESCALATED" => Ok(InstanceStatus::Escalated),
            other => Err(format!("invalid request status: '{other}'")),
        }
    }
}

/// Status of one materialized step.
///
/// Outcome labels other than the well-known ones are kept verbatim in
/// `Resolved`, so a step closed with `NEEDS_INFO` reads back as `NEEDS_INFO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
    Resolved(String),
}

impl StepStatus {
    /// Map a decision outcome label to the status recorded on the step.
    pub fn from_outcome(outcome: &str) -> Self {
        match outcome {
            "APPROVED" => StepStatus::Approved,
            "REJECTED" => StepStatus::Rejected,
            "SKIPPED" => StepStatus::Skipped,
            other => StepStatus::Resolved(other.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, StepStatus::Pending)
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::Approved => "APPROVED",
            StepStatus::Rejected => "REJECTED",
            StepStatus::Skipped => "SKIPPED",
            StepStatus::Resolved(label) => label,
        }
    }
}

impl From<String> for StepStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => StepStatus::Pending,
            other => StepStatus::from_outcome(other),
        }
    }
}

impl From<StepStatus> for String {
    fn from(s: StepStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record of one step within an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStepState {
    pub step_order: u32,
    pub step_name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    /// `started_at + sla_hours`, `None` when the step is unrestricted.
    pub deadline: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    /// Free-form decision context supplied with the outcome (e.g. `{note}`).
    pub note: Option<serde_json::Value>,
    pub acted_by: Option<UserId>,
}

impl RequestStepState {
    /// Whether this step is past its deadline while still pending.
    ///
    /// Always computed from `now`; resolved steps never report a breach.
    pub fn is_sla_breached(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => self.status.is_pending() && now > deadline,
            None => false,
        }
    }
}

/// A running (or finished) execution of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInstance {
    pub id: InstanceId,
    pub definition_id: DefinitionId,
    pub workflow_name: String,
    pub requester_id: UserId,
    pub payload: serde_json::Value,
    pub status: InstanceStatus,
    /// Incremented on every persisted transition; used for optimistic checks.
    pub version: i64,
    pub snapshot: WorkflowSnapshot,
    /// Materialized steps in the order they were reached.
    pub steps: Vec<RequestStepState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RequestInstance {
    /// The single `PENDING` step, if any.
    pub fn current_step(&self) -> Option<&RequestStepState> {
        self.steps.iter().rev().find(|s| s.status.is_pending())
    }

    pub fn current_step_mut(&mut self) -> Option<&mut RequestStepState> {
        self.steps.iter_mut().rev().find(|s| s.status.is_pending())
    }

    pub fn pending_count(&self) -> usize {
        self.steps.iter().filter(|s| s.status.is_pending()).count()
    }

    /// Read model with breach flags evaluated at `now`.
    pub fn view(&self, now: DateTime<Utc>) -> InstanceView {
        InstanceView {
            id: self.id,
            workflow_id: self.definition_id,
            workflow_name: self.workflow_name.clone(),
            requester_id: self.requester_id,
            request_data: self.payload.clone(),
            status: self.status,
            version: self.version,
            current_step_order: self.current_step().map(|s| s.step_order),
            steps: self
                .steps
                .iter()
                .map(|s| StepView {
                    step_order: s.step_order,
                    step_name: s.step_name.clone(),
                    status: s.status.clone(),
                    started_at: s.started_at,
                    deadline: s.deadline,
                    completed_at: s.completed_at,
                    outcome: s.outcome.clone(),
                    note: s.note.clone(),
                    acted_by: s.acted_by,
                    is_sla_breached: s.is_sla_breached(now),
                })
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        }
    }
}

/// Instance as returned to API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceView {
    pub id: InstanceId,
    pub workflow_id: DefinitionId,
    pub workflow_name: String,
    pub requester_id: UserId,
    pub request_data: serde_json::Value,
    pub status: InstanceStatus,
    pub version: i64,
    pub current_step_order: Option<u32>,
    pub steps: Vec<StepView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepView {
    pub step_order: u32,
    pub step_name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    pub note: Option<serde_json::Value>,
    pub acted_by: Option<UserId>,
    pub is_sla_breached: bool,
}

/// Request body for starting an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub workflow_id: DefinitionId,
    #[serde(default)]
    pub request_data: Option<serde_json::Value>,
}

/// One row of the "my pending tasks" projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub request_id: InstanceId,
    pub workflow_name: String,
    pub step_order: u32,
    pub step_name: String,
    pub step_description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub is_sla_breached: bool,
    pub request_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A detected SLA breach, recorded at most once per materialized step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaBreach {
    pub instance_id: InstanceId,
    /// Position of the step in `RequestInstance::steps`. A self-looping
    /// step order can be materialized more than once.
    pub step_index: u32,
    pub step_order: u32,
    pub deadline: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

/// Aggregate counts for dashboard summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub active: u64,
    pub pending: u64,
    pub completed: u64,
    pub rejected: u64,
    pub escalated: u64,
    pub overdue: u64,
}
