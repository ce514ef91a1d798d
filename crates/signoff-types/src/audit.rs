//! Append-only audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::id::{AuditId, InstanceId, UserId};

/// What happened. Stored as its SCREAMING_SNAKE_CASE label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    DefinitionCreated,
    DefinitionActivated,
    DefinitionDeactivated,
    DefinitionDeleted,
    InstanceStarted,
    StepDecided,
    SlaBreachDetected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DefinitionCreated => "DEFINITION_CREATED",
            AuditAction::DefinitionActivated => "DEFINITION_ACTIVATED",
            AuditAction::DefinitionDeactivated => "DEFINITION_DEACTIVATED",
            AuditAction::DefinitionDeleted => "DEFINITION_DELETED",
            AuditAction::InstanceStarted => "INSTANCE_STARTED",
            AuditAction::StepDecided => "STEP_DECIDED",
            AuditAction::SlaBreachDetected => "SLA_BREACH_DETECTED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEFINITION_CREATED" => Ok(AuditAction::DefinitionCreated),
            "DEFINITION_ACTIVATED" => Ok(AuditAction::DefinitionActivated),
            "DEFINITION_DEACTIVATED" => Ok(AuditAction::DefinitionDeactivated),
            "DEFINITION_DELETED" => Ok(AuditAction::DefinitionDeleted),
            "INSTANCE_STARTED" => Ok(AuditAction::InstanceStarted),
            "STEP_DECIDED" => Ok(AuditAction::StepDecided),
            "SLA_BREACH_DETECTED" => Ok(AuditAction::SlaBreachDetected),
            other => Err(format!("invalid audit action: '{other}'")),
        }
    }
}

/// Immutable record of a state transition or administrative action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditId,
    pub instance_id: Option<InstanceId>,
    pub action: AuditAction,
    /// `None` for system actions such as the SLA sweep.
    pub actor_id: Option<UserId>,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        action: AuditAction,
        resource_type: &str,
        resource_id: impl ToString,
        actor_id: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditId::new(),
            instance_id: None,
            action,
            actor_id,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            details: None,
            created_at,
        }
    }

    pub fn for_instance(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
