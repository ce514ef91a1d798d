//! Workflow definition CLI commands.
//!
//! The CLI runs with direct database access, so definition writes are not
//! gated on the admin role here. `--as` only sets `created_by` and the
//! audit actor.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color};
use console::style;

use signoff_core::workflow::definition::parse_definition;
use signoff_types::definition::WorkflowDefinition;
use signoff_types::id::{DefinitionId, UserId};

use crate::cli::{WorkflowCommand, new_table, print_success};
use crate::state::AppState;

pub async fn handle_workflow(
    state: &AppState,
    action: WorkflowCommand,
    as_user: Option<&str>,
    json: bool,
) -> Result<()> {
    let actor_id = match as_user {
        Some(username) => Some(state.directory.user_by_username(username).await?.id),
        None => None,
    };

    match action {
        WorkflowCommand::Create { file } => create(state, &file, actor_id, json).await,
        WorkflowCommand::List => list(state, json).await,
        WorkflowCommand::Show { id } => show(state, &parse_definition_id(&id)?, json).await,
        WorkflowCommand::Delete { id } => {
            let id = parse_definition_id(&id)?;
            state.definitions.delete(&id, actor_id).await?;
            if json {
                println!("{}", serde_json::json!({ "deleted": true, "id": id }));
            } else {
                print_success(&format!("Workflow {id} deleted"));
            }
            Ok(())
        }
        WorkflowCommand::Activate { id } => {
            set_active(state, &parse_definition_id(&id)?, true, actor_id, json).await
        }
        WorkflowCommand::Deactivate { id } => {
            set_active(state, &parse_definition_id(&id)?, false, actor_id, json).await
        }
    }
}

fn parse_definition_id(raw: &str) -> Result<DefinitionId> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid workflow id '{raw}': {e}"))
}

async fn create(
    state: &AppState,
    file: &std::path::Path,
    actor_id: Option<UserId>,
    json: bool,
) -> Result<()> {
    let document = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let request = parse_definition(&document)?;
    let workflow = state.definitions.create(request, actor_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        return Ok(());
    }

    print_success(&format!(
        "Workflow '{}' created with {} step{}",
        workflow.name,
        workflow.steps.len(),
        if workflow.steps.len() == 1 { "" } else { "s" }
    ));
    println!("  {}  {}", style("ID:").bold(), style(workflow.id.to_string()).dim());
    println!();
    Ok(())
}

async fn list(state: &AppState, json: bool) -> Result<()> {
    let workflows = state.definitions.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!(
            "  {} No workflows found. Create one with: {}",
            style("i").blue().bold(),
            style("signoff workflow create --file <definition.yaml>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = new_table(&["Name", "Status", "Steps", "Created", "ID"]);
    for wf in &workflows {
        table.add_row(vec![
            Cell::new(&wf.name).fg(Color::Cyan),
            if wf.is_active {
                Cell::new("● active").fg(Color::Green)
            } else {
                Cell::new("○ inactive").fg(Color::Yellow)
            },
            Cell::new(wf.steps.len()),
            Cell::new(wf.created_at.format("%Y-%m-%d %H:%M")).fg(Color::DarkGrey),
            Cell::new(wf.id.to_string()).fg(Color::DarkGrey),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn show(state: &AppState, id: &DefinitionId, json: bool) -> Result<()> {
    let wf = state.definitions.get(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&wf)?);
        return Ok(());
    }
    print_definition(&wf);
    Ok(())
}

fn print_definition(wf: &WorkflowDefinition) {
    println!();
    println!("  {}", style(&wf.name).cyan().bold());
    if let Some(description) = &wf.description {
        println!("  {}", style(description).dim());
    }
    println!();
    println!(
        "  {}  {}",
        style("Status:").bold(),
        if wf.is_active {
            format!("{}", style("● active").green())
        } else {
            format!("{}", style("○ inactive").yellow())
        }
    );
    println!("  {}      {}", style("ID:").bold(), style(wf.id.to_string()).dim());
    println!();

    println!("  {}", style("── Steps ──").dim());
    let mut steps = new_table(&["#", "Name", "Role", "Permission", "SLA"]);
    for step in &wf.steps {
        steps.add_row(vec![
            Cell::new(step.step_order),
            Cell::new(&step.name).fg(Color::Cyan),
            Cell::new(step.required_role_id.map(|r| r.to_string()).unwrap_or_default()),
            Cell::new(
                step.required_permission_id
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
            ),
            if step.has_sla() {
                Cell::new(format!("{}h", step.sla_hours))
            } else {
                Cell::new("-").fg(Color::DarkGrey)
            },
        ]);
    }
    println!("{steps}");
    println!();

    println!("  {}", style("── Transitions ──").dim());
    let mut transitions = new_table(&["From", "Outcome", "To", "Condition"]);
    for rule in &wf.transitions {
        transitions.add_row(vec![
            Cell::new(rule.from_step_order),
            Cell::new(&rule.outcome),
            match rule.to_step_order {
                Some(to) => Cell::new(to),
                None => Cell::new(
                    rule.final_status
                        .map(|s| format!("end ({s:?})"))
                        .unwrap_or_else(|| "end".to_string()),
                )
                .fg(Color::Magenta),
            },
            Cell::new(
                rule.condition
                    .as_ref()
                    .and_then(|c| serde_json::to_string(c).ok())
                    .unwrap_or_default(),
            )
            .fg(Color::DarkGrey),
        ]);
    }
    println!("{transitions}");
    println!();
}

async fn set_active(
    state: &AppState,
    id: &DefinitionId,
    is_active: bool,
    actor_id: Option<UserId>,
    json: bool,
) -> Result<()> {
    let wf = state.definitions.set_active(id, is_active, actor_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&wf)?);
    } else {
        print_success(&format!(
            "Workflow '{}' {}",
            wf.name,
            if is_active { "activated" } else { "deactivated" }
        ));
    }
    Ok(())
}
