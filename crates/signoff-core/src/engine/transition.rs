//! Pure decision application.
//!
//! [`apply_decision`] takes the current instance and returns the complete
//! next state, its audit entry and the events to publish. It never writes
//! anything, so every failure leaves the instance untouched.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use signoff_types::audit::{AuditAction, AuditLogEntry};
use signoff_types::definition::{
    FinalStatus, StepDefinition, TransitionRule, WorkflowDefinition, WorkflowSnapshot,
};
use signoff_types::directory::Actor;
use signoff_types::error::EngineError;
use signoff_types::event::WorkflowEvent;
use signoff_types::id::{InstanceId, UserId};
use signoff_types::instance::{InstanceStatus, RequestInstance, RequestStepState, StepStatus};

use crate::workflow::authorize::{GateDecision, check_gate};
use crate::workflow::condition::{decision_context, evaluate};

/// Outcome label that terminates with success unless a rule overrides it.
pub const SUCCESS_OUTCOME: &str = "APPROVED";

/// A caller's decision on the current step.
#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub outcome: String,
    /// Free-form decision data, stored on the step and visible to
    /// conditions as `decision_data`.
    pub context: Option<Value>,
    /// Reject the decision unless the instance is still at this version.
    pub expected_version: Option<i64>,
}

impl Decision {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn at_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Where a resolved outcome leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Continue(u32),
    Terminal(InstanceStatus),
}

impl Resolution {
    fn from_rule(rule: &TransitionRule) -> Self {
        match rule.to_step_order {
            Some(next) => Resolution::Continue(next),
            None => {
                let status = match rule.final_status {
                    Some(FinalStatus::Completed) => InstanceStatus::Completed,
                    Some(FinalStatus::Rejected) => InstanceStatus::Rejected,
                    None if rule.outcome == SUCCESS_OUTCOME => InstanceStatus::Completed,
                    None => InstanceStatus::Rejected,
                };
                Resolution::Terminal(status)
            }
        }
    }
}

/// Everything a successful decision produces.
#[derive(Debug, Clone)]
pub struct AppliedDecision {
    pub instance: RequestInstance,
    pub resolution: Resolution,
    pub audit: AuditLogEntry,
    pub events: Vec<WorkflowEvent>,
}

/// Materialize a step as `PENDING` starting at `now`.
pub fn open_step(
    step: &StepDefinition,
    now: DateTime<Utc>,
) -> Result<RequestStepState, EngineError> {
    let deadline = if step.has_sla() {
        let deadline = now
            .checked_add_signed(Duration::hours(i64::from(step.sla_hours)))
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "sla_hours {} on step {} is out of range",
                    step.sla_hours, step.step_order
                ))
            })?;
        Some(deadline)
    } else {
        None
    };

    Ok(RequestStepState {
        step_order: step.step_order,
        step_name: step.name.clone(),
        status: StepStatus::Pending,
        started_at: now,
        deadline,
        completed_at: None,
        outcome: None,
        note: None,
        acted_by: None,
    })
}

/// Build a fresh instance of `definition` with step 1 open.
pub fn initial_instance(
    definition: &WorkflowDefinition,
    requester_id: UserId,
    payload: Value,
    now: DateTime<Utc>,
) -> Result<RequestInstance, EngineError> {
    let snapshot = definition.snapshot();
    let first = snapshot.step(1).ok_or_else(|| {
        EngineError::Validation(format!("workflow '{}' has no step 1", definition.name))
    })?;
    let steps = vec![open_step(first, now)?];

    Ok(RequestInstance {
        id: InstanceId::new(),
        definition_id: definition.id,
        workflow_name: definition.name.clone(),
        requester_id,
        payload,
        status: InstanceStatus::InProgress,
        version: 1,
        snapshot,
        steps,
        created_at: now,
        updated_at: now,
        completed_at: None,
    })
}

pub fn step_assigned(instance: &RequestInstance, step: &StepDefinition) -> WorkflowEvent {
    WorkflowEvent::StepAssigned {
        instance_id: instance.id,
        workflow_name: instance.workflow_name.clone(),
        step_order: step.step_order,
        step_name: step.name.clone(),
        required_role_id: step.required_role_id,
        required_permission_id: step.required_permission_id,
        deadline: instance.current_step().and_then(|s| s.deadline),
    }
}

/// First rule for `(step, outcome)` whose condition holds.
fn resolve<'a>(
    snapshot: &'a WorkflowSnapshot,
    step_order: u32,
    outcome: &'a str,
    context: &Value,
) -> Option<&'a TransitionRule> {
    snapshot
        .rules_for(step_order, outcome)
        .find(|rule| rule.condition.as_ref().is_none_or(|c| evaluate(c, context)))
}

pub fn apply_decision(
    current: &RequestInstance,
    actor: &Actor,
    decision: &Decision,
    now: DateTime<Utc>,
) -> Result<AppliedDecision, EngineError> {
    if let Some(expected) = decision.expected_version {
        if expected != current.version {
            return Err(EngineError::stale());
        }
    }
    if current.status.is_terminal() {
        return Err(EngineError::Conflict(format!(
            "request is already {}",
            current.status
        )));
    }

    let pending = current
        .current_step()
        .ok_or_else(|| EngineError::Conflict("no actionable step".to_string()))?;
    let step_order = pending.step_order;
    let step = current.snapshot.step(step_order).ok_or_else(|| {
        EngineError::Conflict(format!("step {step_order} is missing from the workflow snapshot"))
    })?;

    let gate = check_gate(step, actor);
    let admin_override = gate == GateDecision::Bypassed;
    gate.into_result(step)?;

    let outcome = decision.outcome.trim();
    if outcome.is_empty() {
        return Err(EngineError::Validation("outcome cannot be empty".to_string()));
    }
    if outcome.eq_ignore_ascii_case("PENDING") {
        return Err(EngineError::Validation(format!(
            "'{outcome}' is not a decision outcome"
        )));
    }

    let context = decision_context(&current.payload, decision.context.as_ref());
    let rule = resolve(&current.snapshot, step_order, outcome, &context).ok_or_else(|| {
        let declared = current.snapshot.outcomes_for(step_order).join(", ");
        EngineError::Conflict(format!(
            "undefined transition for outcome '{outcome}' at step {step_order} (declared: {declared})"
        ))
    })?;
    let resolution = Resolution::from_rule(rule);

    let mut next = current.clone();
    let from_status = current.status;
    if let Some(state) = next.current_step_mut() {
        state.status = StepStatus::from_outcome(outcome);
        state.completed_at = Some(now);
        state.outcome = Some(outcome.to_string());
        state.note = decision.context.clone();
        state.acted_by = Some(actor.user_id);
    }

    let mut events = Vec::with_capacity(1);
    match resolution {
        Resolution::Continue(target) => {
            let target_step = current.snapshot.step(target).ok_or_else(|| {
                EngineError::Conflict(format!("step {target} is missing from the workflow snapshot"))
            })?;
            next.steps.push(open_step(target_step, now)?);
            next.status = InstanceStatus::InProgress;
            events.push(step_assigned(&next, target_step));
        }
        Resolution::Terminal(status) => {
            next.status = status;
            next.completed_at = Some(now);
            events.push(WorkflowEvent::InstanceFinished {
                instance_id: next.id,
                workflow_name: next.workflow_name.clone(),
                status,
            });
        }
    }
    next.version = current.version + 1;
    next.updated_at = now;

    let (next_step_order, final_status) = match resolution {
        Resolution::Continue(target) => (Some(target), None),
        Resolution::Terminal(status) => (None, Some(status)),
    };
    let audit = AuditLogEntry::new(
        AuditAction::StepDecided,
        "request",
        current.id,
        Some(actor.user_id),
        now,
    )
    .for_instance(current.id)
    .with_details(json!({
        "step_order": step_order,
        "step_name": step.name,
        "outcome": outcome,
        "from_status": from_status,
        "to_status": next.status,
        "next_step_order": next_step_order,
        "final_status": final_status,
        "context": decision.context,
        "admin_override": admin_override,
    }));

    Ok(AppliedDecision {
        instance: next,
        resolution,
        audit,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_with_roles, instance_for, scenario_definition};
    use signoff_types::id::RoleId;

    fn start(manager: RoleId, finance: RoleId, now: DateTime<Utc>) -> RequestInstance {
        instance_for(&scenario_definition(manager, finance), now)
    }

    #[test]
    fn approval_advances_to_next_step() {
        let (manager, finance) = (RoleId::new(), RoleId::new());
        let now = Utc::now();
        let instance = start(manager, finance, now);
        let later = now + Duration::hours(2);

        let applied = apply_decision(
            &instance,
            &actor_with_roles(vec![manager]),
            &Decision::new("APPROVED").with_context(json!({"note": "ok"})),
            later,
        )
        .unwrap();

        assert_eq!(applied.resolution, Resolution::Continue(2));
        let next = &applied.instance;
        assert_eq!(next.status, InstanceStatus::InProgress);
        assert_eq!(next.version, instance.version + 1);
        assert_eq!(next.steps.len(), 2);
        assert_eq!(next.steps[0].status, StepStatus::Approved);
        assert_eq!(next.steps[0].note, Some(json!({"note": "ok"})));
        assert_eq!(next.pending_count(), 1);
        assert_eq!(next.steps[1].deadline, Some(later + Duration::hours(48)));
        assert!(matches!(
            applied.events.as_slice(),
            [WorkflowEvent::StepAssigned { step_order: 2, .. }]
        ));
        assert_eq!(applied.audit.action, AuditAction::StepDecided);
    }

    #[test]
    fn rejection_at_first_step_terminates() {
        let (manager, finance) = (RoleId::new(), RoleId::new());
        let instance = start(manager, finance, Utc::now());

        let applied = apply_decision(
            &instance,
            &actor_with_roles(vec![manager]),
            &Decision::new("REJECTED"),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(applied.resolution, Resolution::Terminal(InstanceStatus::Rejected));
        assert_eq!(applied.instance.status, InstanceStatus::Rejected);
        assert_eq!(applied.instance.pending_count(), 0);
        assert!(applied.instance.completed_at.is_some());

        // A terminal instance accepts nothing further.
        let again = apply_decision(
            &applied.instance,
            &actor_with_roles(vec![manager]),
            &Decision::new("APPROVED"),
            Utc::now(),
        );
        assert!(matches!(again, Err(EngineError::Conflict(_))));
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let (manager, finance) = (RoleId::new(), RoleId::new());
        let instance = start(manager, finance, Utc::now());
        let result = apply_decision(
            &instance,
            &actor_with_roles(vec![finance]),
            &Decision::new("APPROVED"),
            Utc::now(),
        );
        assert!(matches!(result, Err(EngineError::Forbidden(_))));
    }

    #[test]
    fn undeclared_outcome_is_conflict() {
        let (manager, finance) = (RoleId::new(), RoleId::new());
        let instance = start(manager, finance, Utc::now());
        let result = apply_decision(
            &instance,
            &actor_with_roles(vec![manager]),
            &Decision::new("MAYBE"),
            Utc::now(),
        );
        match result {
            Err(EngineError::Conflict(msg)) => assert!(msg.contains("undefined transition")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn pending_and_blank_outcomes_are_invalid() {
        let (manager, finance) = (RoleId::new(), RoleId::new());
        let instance = start(manager, finance, Utc::now());
        let actor = actor_with_roles(vec![manager]);
        for outcome in ["PENDING", "  "] {
            let result = apply_decision(&instance, &actor, &Decision::new(outcome), Utc::now());
            assert!(matches!(result, Err(EngineError::Validation(_))), "{outcome}");
        }
    }

    #[test]
    fn stale_expected_version_is_conflict() {
        let (manager, finance) = (RoleId::new(), RoleId::new());
        let instance = start(manager, finance, Utc::now());
        let result = apply_decision(
            &instance,
            &actor_with_roles(vec![manager]),
            &Decision::new("APPROVED").at_version(instance.version + 3),
            Utc::now(),
        );
        assert!(matches!(result, Err(EngineError::Conflict(msg)) if msg == "stale instance state"));
    }

    #[test]
    fn custom_terminal_label_defaults_to_rejected() {
        let rule = TransitionRule {
            from_step_order: 1,
            outcome: "WITHDRAWN".to_string(),
            to_step_order: None,
            condition: None,
            final_status: None,
        };
        assert_eq!(Resolution::from_rule(&rule), Resolution::Terminal(InstanceStatus::Rejected));

        let overridden = TransitionRule {
            final_status: Some(FinalStatus::Completed),
            ..rule
        };
        assert_eq!(
            Resolution::from_rule(&overridden),
            Resolution::Terminal(InstanceStatus::Completed)
        );
    }

    #[test]
    fn admin_override_is_recorded() {
        let (manager, finance) = (RoleId::new(), RoleId::new());
        let instance = start(manager, finance, Utc::now());
        let mut admin = actor_with_roles(vec![]);
        admin.is_admin = true;

        let applied =
            apply_decision(&instance, &admin, &Decision::new("APPROVED"), Utc::now()).unwrap();
        let details = applied.audit.details.unwrap();
        assert_eq!(details["admin_override"], true);
        assert_eq!(details["next_step_order"], 2);
    }

    #[test]
    fn deadline_overflow_is_validation_error() {
        let step = crate::testing::step(1, "Forever", None, u32::MAX);
        assert!(matches!(
            open_step(&step, Utc::now()),
            Err(EngineError::Validation(msg)) if msg.contains("out of range")
        ));

        let step = crate::testing::step(1, "Week", None, 168);
        let now = Utc::now();
        let state = open_step(&step, now).unwrap();
        assert_eq!(state.deadline, Some(now + Duration::hours(168)));
    }
}
