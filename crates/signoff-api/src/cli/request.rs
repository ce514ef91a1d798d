//! Request lifecycle CLI commands: start, show, list, process, tasks.

use anyhow::Result;
use comfy_table::{Cell, Color};
use console::style;

use signoff_core::engine::Decision;
use signoff_core::repository::instance::InstanceFilter;
use signoff_types::id::{DefinitionId, InstanceId};
use signoff_types::instance::{InstanceStatus, InstanceView, StepStatus};

use crate::cli::{
    RequestCommand, format_status, new_table, parse_json_arg, require_actor, status_cell,
};
use crate::state::AppState;

fn parse_request_id(raw: &str) -> Result<InstanceId> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid request id '{raw}': {e}"))
}

pub async fn handle_request(
    state: &AppState,
    action: RequestCommand,
    as_user: Option<&str>,
    json: bool,
) -> Result<()> {
    match action {
        RequestCommand::Start { workflow_id, data } => {
            let actor = require_actor(state, as_user).await?;
            let workflow_id: DefinitionId = workflow_id
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid workflow id '{workflow_id}': {e}"))?;
            let payload = match data {
                Some(raw) => parse_json_arg("data", &raw)?,
                None => serde_json::json!({}),
            };

            let instance = state
                .instances
                .start(&workflow_id, actor.user_id, payload)
                .await?;
            print_view(&instance.view(state.clock.now()), json)
        }
        RequestCommand::Show { id } => {
            let instance = state.instances.get(&parse_request_id(&id)?).await?;
            print_view(&instance.view(state.clock.now()), json)
        }
        RequestCommand::List {
            status,
            mine,
            limit,
        } => {
            let status = match status {
                Some(s) => Some(s.parse::<InstanceStatus>().map_err(|e| anyhow::anyhow!(e))?),
                None => None,
            };
            let requester_id = if mine {
                Some(require_actor(state, as_user).await?.user_id)
            } else {
                None
            };
            let instances = state
                .instances
                .list(InstanceFilter {
                    status,
                    requester_id,
                    limit: Some(limit),
                    offset: None,
                })
                .await?;
            let now = state.clock.now();
            let views: Vec<InstanceView> = instances.iter().map(|i| i.view(now)).collect();
            print_list(&views, json)
        }
    }
}

/// Build a decision from CLI flags. `--context` wins over `--comment`.
pub fn build_decision(
    outcome: &str,
    comment: Option<String>,
    context: Option<String>,
    version: Option<i64>,
) -> Result<Decision> {
    let context = match (context, comment) {
        (Some(raw), _) => Some(parse_json_arg("context", &raw)?),
        (None, Some(comment)) => Some(serde_json::json!({ "comment": comment })),
        (None, None) => None,
    };
    Ok(Decision {
        outcome: outcome.trim().to_uppercase(),
        context,
        expected_version: version,
    })
}

pub async fn process(
    state: &AppState,
    as_user: Option<&str>,
    id: &str,
    decision: Decision,
    json: bool,
) -> Result<()> {
    let actor = require_actor(state, as_user).await?;
    let instance = state
        .executor
        .process(&parse_request_id(id)?, &actor, decision)
        .await?;
    print_view(&instance.view(state.clock.now()), json)
}

pub async fn tasks(state: &AppState, as_user: Option<&str>, json: bool) -> Result<()> {
    let actor = require_actor(state, as_user).await?;
    let tasks = state.tasks.my_tasks(&actor).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!();
        println!(
            "  {} Nothing waiting on {}",
            style("i").blue().bold(),
            style(&actor.username).cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = new_table(&["Request", "Workflow", "Step", "Deadline"]);
    for task in &tasks {
        let deadline = match task.deadline {
            Some(d) if task.is_sla_breached => {
                Cell::new(format!("{} (overdue)", d.format("%Y-%m-%d %H:%M"))).fg(Color::Red)
            }
            Some(d) => Cell::new(d.format("%Y-%m-%d %H:%M")),
            None => Cell::new("-").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(task.request_id.to_string()).fg(Color::DarkGrey),
            Cell::new(&task.workflow_name).fg(Color::Cyan),
            Cell::new(format!("{}. {}", task.step_order, task.step_name)),
            deadline,
        ]);
    }
    println!();
    println!("{table}");
    println!();
    println!(
        "  {} task{}",
        style(tasks.len()).bold(),
        if tasks.len() == 1 { "" } else { "s" }
    );
    println!();
    Ok(())
}

fn print_list(views: &[InstanceView], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!();
        println!("  {} No requests found.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = new_table(&["ID", "Workflow", "Status", "Step", "Created"]);
    for view in views {
        table.add_row(vec![
            Cell::new(view.id.to_string()).fg(Color::DarkGrey),
            Cell::new(&view.workflow_name).fg(Color::Cyan),
            status_cell(view.status),
            Cell::new(
                view.current_step_order
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(view.created_at.format("%Y-%m-%d %H:%M")).fg(Color::DarkGrey),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn print_view(view: &InstanceView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(&view.workflow_name).cyan().bold(),
        style(view.id.to_string()).dim()
    );
    println!();
    println!("  {}   {}", style("Status:").bold(), format_status(view.status));
    println!("  {}  {}", style("Version:").bold(), view.version);
    println!("  {}     {}", style("Data:").bold(), view.request_data);
    println!();

    println!("  {}", style("── Steps ──").dim());
    let mut table = new_table(&["#", "Step", "Status", "Decided by", "Deadline"]);
    for step in &view.steps {
        let status = match &step.status {
            StepStatus::Pending => Cell::new("pending").fg(Color::Cyan),
            StepStatus::Approved => Cell::new("approved").fg(Color::Green),
            StepStatus::Rejected => Cell::new("rejected").fg(Color::Red),
            other => Cell::new(other.as_str().to_lowercase()).fg(Color::Yellow),
        };
        let deadline = match step.deadline {
            Some(d) if step.is_sla_breached => {
                Cell::new(format!("{} (breached)", d.format("%Y-%m-%d %H:%M"))).fg(Color::Red)
            }
            Some(d) => Cell::new(d.format("%Y-%m-%d %H:%M")),
            None => Cell::new("-").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(step.step_order),
            Cell::new(&step.step_name),
            status,
            Cell::new(step.acted_by.map(|u| u.to_string()).unwrap_or_default())
                .fg(Color::DarkGrey),
            deadline,
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}
