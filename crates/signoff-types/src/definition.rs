//! Workflow definition types: the reusable template a request runs against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::id::{DefinitionId, PermissionId, RoleId, UserId};

/// A published workflow template.
///
/// Steps and transitions never change after creation; the only mutable
/// field is `is_active`, which controls whether new requests may start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: DefinitionId,
    /// Unique display name.
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    /// Ordered by `step_order`, contiguous from 1.
    pub steps: Vec<StepDefinition>,
    pub transitions: Vec<TransitionRule>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Freeze the topology for a new instance.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            steps: self.steps.clone(),
            transitions: self.transitions.clone(),
        }
    }
}

/// A single gated stage of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// 1-based position, unique within the definition.
    pub step_order: u32,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_role_id: Option<RoleId>,
    #[serde(default)]
    pub required_permission_id: Option<PermissionId>,
    /// Hours until the step breaches its SLA. 0 means unrestricted.
    #[serde(default)]
    pub sla_hours: u32,
    /// Reserved for branch-only steps; stored but not interpreted.
    #[serde(default)]
    pub is_conditional: bool,
}

impl StepDefinition {
    pub fn has_sla(&self) -> bool {
        self.sla_hours > 0
    }
}

/// Maps `(from_step_order, outcome)` to the next step or to termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from_step_order: u32,
    /// Caller-defined label, conventionally `APPROVED` / `REJECTED`.
    pub outcome: String,
    /// Next step, or `None` for a terminal transition.
    #[serde(default)]
    pub to_step_order: Option<u32>,
    /// Optional guard evaluated against request and decision data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<TransitionCondition>,
    /// Overrides the final instance status of a terminal rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<FinalStatus>,
}

impl TransitionRule {
    pub fn is_terminal(&self) -> bool {
        self.to_step_order.is_none()
    }
}

/// Guard on a transition rule: `field <operator> value`.
///
/// `field` is a dotted path into `{"request_data": .., "decision_data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionCondition {
    pub field: String,
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "contains")]
    Contains,
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionOperator::Eq => "==",
            ConditionOperator::Ne => "!=",
            ConditionOperator::Gt => ">",
            ConditionOperator::Lt => "<",
            ConditionOperator::Ge => ">=",
            ConditionOperator::Le => "<=",
            ConditionOperator::In => "in",
            ConditionOperator::Contains => "contains",
        };
        f.write_str(s)
    }
}

/// Polarity of a terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Completed,
    Rejected,
}

/// Frozen copy of a definition's topology, stored on each instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub steps: Vec<StepDefinition>,
    pub transitions: Vec<TransitionRule>,
}

impl WorkflowSnapshot {
    pub fn step(&self, step_order: u32) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    /// Rules matching `(from, outcome)` in declaration order.
    pub fn rules_for<'a>(
        &'a self,
        from_step_order: u32,
        outcome: &'a str,
    ) -> impl Iterator<Item = &'a TransitionRule> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.from_step_order == from_step_order && t.outcome == outcome)
    }

    /// Distinct outcome labels declared for a step.
    pub fn outcomes_for(&self, from_step_order: u32) -> Vec<&str> {
        let mut outcomes: Vec<&str> = Vec::new();
        for rule in self.transitions.iter().filter(|t| t.from_step_order == from_step_order) {
            if !outcomes.contains(&rule.outcome.as_str()) {
                outcomes.push(rule.outcome.as_str());
            }
        }
        outcomes
    }
}

/// Request to create a definition. Ids and timestamps are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDefinitionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub transitions: Vec<TransitionRule>,
}
