//! Step authorization gates.
//!
//! A step may require a role, a permission, or both. When both are set the
//! actor must satisfy both. Holders of the admin role pass every gate.

use signoff_types::definition::StepDefinition;
use signoff_types::directory::Actor;
use signoff_types::error::EngineError;
use signoff_types::id::{PermissionId, RoleId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    /// The actor fails the gate but holds the admin role.
    Bypassed,
    MissingRole(RoleId),
    MissingPermission(PermissionId),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed | GateDecision::Bypassed)
    }

    pub fn into_result(self, step: &StepDefinition) -> Result<(), EngineError> {
        match self {
            GateDecision::Allowed | GateDecision::Bypassed => Ok(()),
            GateDecision::MissingRole(role) => Err(EngineError::Forbidden(format!(
                "step '{}' requires role {role}",
                step.name
            ))),
            GateDecision::MissingPermission(permission) => Err(EngineError::Forbidden(format!(
                "step '{}' requires permission {permission}",
                step.name
            ))),
        }
    }
}

pub fn check_gate(step: &StepDefinition, actor: &Actor) -> GateDecision {
    match check_membership(step, actor) {
        GateDecision::Allowed => GateDecision::Allowed,
        _ if actor.is_admin => GateDecision::Bypassed,
        denied => denied,
    }
}

fn check_membership(step: &StepDefinition, actor: &Actor) -> GateDecision {
    if let Some(role) = step.required_role_id {
        if !actor.has_role(&role) {
            return GateDecision::MissingRole(role);
        }
    }
    if let Some(permission) = step.required_permission_id {
        if !actor.has_permission(&permission) {
            return GateDecision::MissingPermission(permission);
        }
    }
    GateDecision::Allowed
}
