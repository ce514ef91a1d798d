//! Workflow definition parsing and structural validation.
//!
//! A definition is accepted only if every step reachable from step 1 can
//! reach a terminal transition, so no valid definition can strand an
//! instance in a step with nowhere to go.

use std::collections::{BTreeSet, HashSet};

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;

use signoff_types::definition::CreateDefinitionRequest;
use signoff_types::error::EngineError;

/// Outcome label reserved for the open state of a step.
const RESERVED_OUTCOME: &str = "PENDING";

/// Longest SLA a step may declare: ten years.
pub const MAX_SLA_HOURS: u32 = 24 * 365 * 10;

/// Graph node standing for "instance finished". Step orders start at 1.
const TERMINAL: u32 = 0;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML (or JSON) document into a validated creation request.
pub fn parse_definition(document: &str) -> Result<CreateDefinitionRequest, EngineError> {
    let mut request: CreateDefinitionRequest = serde_yaml_ng::from_str(document)
        .map_err(|e| EngineError::Validation(format!("invalid definition document: {e}")))?;
    normalize_definition(&mut request);
    validate_definition(&request)?;
    Ok(request)
}

/// Trim the labels that decisions are matched against.
pub fn normalize_definition(request: &mut CreateDefinitionRequest) {
    request.name = request.name.trim().to_string();
    for step in &mut request.steps {
        step.name = step.name.trim().to_string();
    }
    for rule in &mut request.transitions {
        rule.outcome = rule.outcome.trim().to_string();
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_definition(request: &CreateDefinitionRequest) -> Result<(), EngineError> {
    if request.name.trim().is_empty() {
        return Err(invalid("workflow name cannot be empty"));
    }
    if request.steps.is_empty() {
        return Err(invalid("workflow must have at least one step"));
    }

    // Step orders must be exactly 1..=N.
    let mut orders = BTreeSet::new();
    for step in &request.steps {
        if step.name.trim().is_empty() {
            return Err(invalid(format!("step {} has an empty name", step.step_order)));
        }
        if step.sla_hours > MAX_SLA_HOURS {
            return Err(invalid(format!(
                "step {} sla_hours {} exceeds the maximum of {MAX_SLA_HOURS}",
                step.step_order, step.sla_hours
            )));
        }
        if !orders.insert(step.step_order) {
            return Err(invalid(format!("duplicate step_order {}", step.step_order)));
        }
    }
    let expected: BTreeSet<u32> = (1..=request.steps.len() as u32).collect();
    if orders != expected {
        return Err(invalid(format!(
            "step orders must be contiguous from 1, got {:?}",
            orders.iter().collect::<Vec<_>>()
        )));
    }

    let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
    graph.add_node(TERMINAL);
    for order in &orders {
        graph.add_node(*order);
    }
    let mut unconditional: HashSet<(u32, &str)> = HashSet::new();

    for rule in &request.transitions {
        let outcome = rule.outcome.trim();
        if outcome.is_empty() {
            return Err(invalid(format!(
                "transition from step {} has an empty outcome",
                rule.from_step_order
            )));
        }
        if outcome.eq_ignore_ascii_case(RESERVED_OUTCOME) {
            return Err(invalid(format!("outcome '{RESERVED_OUTCOME}' is reserved")));
        }
        if !orders.contains(&rule.from_step_order) {
            return Err(invalid(format!(
                "transition references unknown step {}",
                rule.from_step_order
            )));
        }
        if let Some(to) = rule.to_step_order {
            if !orders.contains(&to) {
                return Err(invalid(format!(
                    "transition from step {} targets unknown step {to}",
                    rule.from_step_order
                )));
            }
            if rule.final_status.is_some() {
                return Err(invalid(format!(
                    "final_status is only allowed on terminal transitions (step {} -> {to})",
                    rule.from_step_order
                )));
            }
        }
        match &rule.condition {
            Some(condition) if condition.field.trim().is_empty() => {
                return Err(invalid(format!(
                    "condition on step {} '{outcome}' has an empty field",
                    rule.from_step_order
                )));
            }
            Some(_) => {}
            None => {
                if !unconditional.insert((rule.from_step_order, outcome)) {
                    return Err(invalid(format!(
                        "duplicate transition for step {} outcome '{outcome}'",
                        rule.from_step_order
                    )));
                }
            }
        }
        graph.add_edge(
            rule.from_step_order,
            rule.to_step_order.unwrap_or(TERMINAL),
            (),
        );
    }

    for order in &orders {
        if graph.neighbors(*order).next().is_none() {
            return Err(invalid(format!("step {order} has no outgoing transition")));
        }
    }

    let mut reachable = BTreeSet::new();
    let mut dfs = Dfs::new(&graph, 1);
    while let Some(order) = dfs.next(&graph) {
        if order != TERMINAL {
            reachable.insert(order);
        }
    }
    for order in &reachable {
        if !has_path_connecting(&graph, *order, TERMINAL, None) {
            return Err(invalid(format!(
                "step {order} cannot reach a terminal transition"
            )));
        }
    }
    for order in orders.difference(&reachable) {
        tracing::warn!(workflow = %request.name, step = order, "step is unreachable from step 1");
    }

    Ok(())
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::Validation(msg.into())
}
