//! Operational commands: migrate, stats, audit, sweep.

use anyhow::Result;
use comfy_table::{Cell, Color};
use console::style;

use signoff_types::id::InstanceId;

use crate::cli::new_table;
use crate::state::AppState;

/// Migrations already ran while opening the pool; report where.
pub async fn migrate(state: &AppState, json: bool) -> Result<()> {
    let db_path = state.data_dir.join("signoff.db");
    if json {
        println!(
            "{}",
            serde_json::json!({ "migrated": true, "database": db_path.display().to_string() })
        );
    } else {
        println!();
        println!(
            "  {} Schema up to date at {}",
            style("✓").green().bold(),
            style(db_path.display()).dim()
        );
        println!();
    }
    Ok(())
}

/// Dashboard counters for requests, tasks and SLA breaches.
pub async fn stats(state: &AppState, json: bool) -> Result<()> {
    let dashboard = state.tasks.stats().await?;
    let workflows = state.definitions.count().await?;
    let users = state.directory.count_users().await?;
    let breaches = state.instances.count_breaches().await?;

    if json {
        let stats = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "users": users,
            "workflows": workflows,
            "requests": dashboard,
            "sla_breaches": breaches,
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {} Signoff v{}", style("⚡").bold(), env!("CARGO_PKG_VERSION"));
    println!();

    println!("  {}", style("── Requests ──").dim());
    println!("  Active:     {}", style(dashboard.active).cyan());
    println!("  Completed:  {}", style(dashboard.completed).green());
    println!("  Rejected:   {}", style(dashboard.rejected).red());
    if dashboard.escalated > 0 {
        println!("  Escalated:  {}", style(dashboard.escalated).yellow());
    }
    println!();

    println!("  {}", style("── Tasks ──").dim());
    println!("  Pending:    {}", style(dashboard.pending).bold());
    println!(
        "  Overdue:    {}",
        if dashboard.overdue > 0 {
            style(dashboard.overdue).red()
        } else {
            style(dashboard.overdue).dim()
        }
    );
    println!("  Breaches:   {}", breaches);
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Workflows:  {workflows}");
    println!("  Users:      {users}");
    println!("  Data dir:   {}", style(state.data_dir.display()).dim());
    println!();
    Ok(())
}

pub async fn audit(state: &AppState, request: Option<String>, limit: i64, json: bool) -> Result<()> {
    let entries = match request {
        Some(raw) => {
            let id: InstanceId = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid request id '{raw}': {e}"))?;
            state.audit.list_by_instance(&id).await?
        }
        None => state.audit.list_recent(limit).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  {} No audit entries.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = new_table(&["When", "Action", "Resource", "Actor", "Details"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(entry.action).fg(Color::Cyan),
            Cell::new(format!("{} {}", entry.resource_type, entry.resource_id)),
            Cell::new(
                entry
                    .actor_id
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "system".to_string()),
            ),
            Cell::new(
                entry
                    .details
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            )
            .fg(Color::DarkGrey),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// One SLA sweep, as run periodically by `serve`.
pub async fn sweep(state: &AppState, json: bool) -> Result<()> {
    let report = state.sweeper.sweep_once().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Scanned {} open request{}",
        style("✓").green().bold(),
        report.scanned,
        if report.scanned == 1 { "" } else { "s" }
    );
    if report.breaches > 0 {
        println!(
            "  {} {} new SLA breach{}",
            style("!").red().bold(),
            report.breaches,
            if report.breaches == 1 { "" } else { "es" }
        );
    }
    if report.escalated > 0 {
        println!("  {} {} escalated", style("▲").yellow(), report.escalated);
    }
    println!();
    Ok(())
}
