//! Event types for the Signoff engine event bus.
//!
//! `WorkflowEvent` is broadcast after a transition has been persisted. All
//! variants are Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{InstanceId, PermissionId, RoleId};
use crate::instance::InstanceStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A step became the current pending step of an instance.
    StepAssigned {
        instance_id: InstanceId,
        workflow_name: String,
        step_order: u32,
        step_name: String,
        required_role_id: Option<RoleId>,
        required_permission_id: Option<PermissionId>,
        deadline: Option<DateTime<Utc>>,
    },

    /// An instance reached a terminal status.
    InstanceFinished {
        instance_id: InstanceId,
        workflow_name: String,
        status: InstanceStatus,
    },

    /// The SLA sweep found a pending step past its deadline.
    SlaBreached {
        instance_id: InstanceId,
        workflow_name: String,
        step_order: u32,
        step_name: String,
        deadline: DateTime<Utc>,
    },
}
