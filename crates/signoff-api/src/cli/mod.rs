//! CLI command definitions for the `signoff` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! resource (`signoff workflow create`, `signoff user token`), with the
//! request lifecycle verbs (`process`, `tasks`) at the top level.

pub mod admin;
pub mod directory;
pub mod request;
pub mod workflow;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use signoff_types::directory::Actor;
use signoff_types::instance::InstanceStatus;

use crate::state::AppState;

/// Multi-step approval workflows with role gates and SLA tracking.
#[derive(Parser)]
#[command(name = "signoff", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Act as this user for commands that need an actor.
    #[arg(long = "as", global = true, env = "SIGNOFF_USER")]
    pub as_user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for signoff_observe::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => signoff_observe::LogFormat::Pretty,
            LogFormatArg::Json => signoff_observe::LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server and the SLA sweep.
    Serve {
        /// Port to listen on (overrides signoff.toml).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides signoff.toml).
        #[arg(long)]
        host: Option<String>,
    },

    /// Create or upgrade the database schema and exit.
    Migrate,

    /// Manage users and their API tokens.
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Manage roles.
    Role {
        #[command(subcommand)]
        action: RoleCommand,
    },

    /// Manage permissions.
    Permission {
        #[command(subcommand)]
        action: PermissionCommand,
    },

    /// Manage workflow definitions.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommand,
    },

    /// Start and inspect requests.
    #[command(alias = "req")]
    Request {
        #[command(subcommand)]
        action: RequestCommand,
    },

    /// Decide the current step of a request (requires --as).
    #[command(disable_version_flag = true)]
    Process {
        /// Request ID.
        id: String,

        /// Decision outcome, e.g. APPROVED or REJECTED.
        outcome: String,

        /// Free-text comment stored with the decision.
        #[arg(long)]
        comment: Option<String>,

        /// Decision data as a JSON object (overrides --comment).
        #[arg(long)]
        context: Option<String>,

        /// Refuse unless the request is still at this version.
        #[arg(long)]
        version: Option<i64>,
    },

    /// List pending steps the acting user may decide (requires --as).
    Tasks,

    /// Show audit log entries.
    Audit {
        /// Only entries for this request.
        #[arg(long)]
        request: Option<String>,

        /// Maximum number of recent entries.
        #[arg(long, default_value = "50")]
        limit: i64,
    },

    /// Dashboard counters.
    Stats,

    /// Run one SLA sweep and report the breaches recorded.
    Sweep,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create a user.
    Create {
        username: String,

        /// Display name (defaults to the username).
        #[arg(long)]
        full_name: Option<String>,

        /// Role to assign (repeatable).
        #[arg(long = "role")]
        roles: Vec<String>,
    },
    /// List users.
    List,
    /// Issue an API token. The token is shown once.
    Token {
        username: String,

        #[arg(long, default_value = "cli")]
        label: String,
    },
    /// Assign a role to an existing user.
    Assign { username: String, role: String },
}

#[derive(Subcommand)]
pub enum RoleCommand {
    /// Create a role.
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Permission to grant (repeatable).
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },
    /// List roles.
    List,
    /// Grant a permission to a role.
    Grant { role: String, permission: String },
}

#[derive(Subcommand)]
pub enum PermissionCommand {
    /// Create a permission, e.g. `finance:approve`.
    Create {
        name: String,

        #[arg(long)]
        resource: String,

        #[arg(long)]
        action: String,

        #[arg(long)]
        description: Option<String>,
    },
    /// List permissions.
    List,
}

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Create a workflow from a YAML or JSON definition file.
    Create {
        /// Path to the definition document.
        #[arg(long, short)]
        file: std::path::PathBuf,
    },
    /// List workflows.
    List,
    /// Show a workflow with its steps and transitions.
    Show { id: String },
    /// Delete a workflow that no open request references.
    Delete { id: String },
    /// Allow new requests against a workflow.
    Activate { id: String },
    /// Stop new requests against a workflow.
    Deactivate { id: String },
}

#[derive(Subcommand)]
pub enum RequestCommand {
    /// Start a request against a workflow (requires --as).
    Start {
        /// Workflow ID.
        workflow_id: String,

        /// Request data as a JSON object.
        #[arg(long)]
        data: Option<String>,
    },
    /// Show a request with its step history.
    Show { id: String },
    /// List requests, newest first.
    List {
        /// Filter by status (IN_PROGRESS, COMPLETED, ...).
        #[arg(long)]
        status: Option<String>,

        /// Only requests started by the acting user.
        #[arg(long)]
        mine: bool,

        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

/// Resolve the `--as` user into an actor, failing with a hint when absent.
pub async fn require_actor(state: &AppState, as_user: Option<&str>) -> Result<Actor> {
    let username = as_user.ok_or_else(|| {
        anyhow::anyhow!("this command needs an acting user; pass --as <username> or set SIGNOFF_USER")
    })?;
    Ok(state.directory.actor_by_username(username).await?)
}

/// Parse a JSON object argument.
pub fn parse_json_arg(flag: &str, raw: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--{flag} is not valid JSON: {e}"))?;
    if !value.is_object() {
        anyhow::bail!("--{flag} must be a JSON object");
    }
    Ok(value)
}

pub(crate) fn format_status(status: InstanceStatus) -> String {
    match status {
        InstanceStatus::InProgress => format!("{}", style("● in progress").cyan()),
        InstanceStatus::Completed => format!("{}", style("✓ completed").green()),
        InstanceStatus::Rejected => format!("{}", style("✗ rejected").red()),
        InstanceStatus::Escalated => format!("{}", style("▲ escalated").yellow()),
        InstanceStatus::Created => format!("{}", style("○ created").dim()),
    }
}

pub(crate) fn status_cell(status: InstanceStatus) -> Cell {
    match status {
        InstanceStatus::InProgress => Cell::new("● in progress").fg(Color::Cyan),
        InstanceStatus::Completed => Cell::new("✓ completed").fg(Color::Green),
        InstanceStatus::Rejected => Cell::new("✗ rejected").fg(Color::Red),
        InstanceStatus::Escalated => Cell::new("▲ escalated").fg(Color::Yellow),
        InstanceStatus::Created => Cell::new("○ created").fg(Color::DarkGrey),
    }
}

pub(crate) fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::White))
            .collect::<Vec<_>>(),
    );
    table
}

pub(crate) fn print_success(message: &str) {
    println!();
    println!("  {} {message}", style("✓").green().bold());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_process_with_global_actor() {
        let cli = Cli::try_parse_from([
            "signoff", "process", "0193", "approved", "--comment", "ok", "--as", "maria",
        ])
        .unwrap();
        assert_eq!(cli.as_user.as_deref(), Some("maria"));
        match cli.command {
            Commands::Process { outcome, comment, .. } => {
                assert_eq!(outcome, "approved");
                assert_eq!(comment.as_deref(), Some("ok"));
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn json_args_must_be_objects() {
        assert!(parse_json_arg("data", r#"{"amount": 5}"#).is_ok());
        assert!(parse_json_arg("data", "[1, 2]").is_err());
        assert!(parse_json_arg("data", "not json").is_err());
    }
}
