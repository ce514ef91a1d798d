//! Signoff CLI and REST API entry point.
//!
//! Binary name: `signoff`
//!
//! Parses CLI arguments, initializes database and services, then dispatches
//! to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod notify;
mod state;

use std::time::Duration;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; the server logs at info by default
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 if matches!(cli.command, Commands::Serve { .. }) => signoff_observe::DEFAULT_FILTER,
        0 => "warn",
        1 => "info,signoff=debug,sqlx=warn",
        _ => "trace",
    };
    signoff_observe::init_tracing(cli.log_format.into(), filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "signoff", &mut std::io::stdout());
        return Ok(());
    }

    // Initialize application state (DB, migrations, services)
    let state = AppState::init().await?;
    let as_user = cli.as_user.as_deref();
    let json = cli.json;

    let result = match cli.command {
        Commands::Serve { port, host } => serve(state, host, port).await,
        Commands::Migrate => cli::admin::migrate(&state, json).await,
        Commands::User { action } => cli::directory::handle_user(&state, action, json).await,
        Commands::Role { action } => cli::directory::handle_role(&state, action, json).await,
        Commands::Permission { action } => {
            cli::directory::handle_permission(&state, action, json).await
        }
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow(&state, action, as_user, json).await
        }
        Commands::Request { action } => {
            cli::request::handle_request(&state, action, as_user, json).await
        }
        Commands::Process {
            id,
            outcome,
            comment,
            context,
            version,
        } => match cli::request::build_decision(&outcome, comment, context, version) {
            Ok(decision) => cli::request::process(&state, as_user, &id, decision, json).await,
            Err(e) => Err(e),
        },
        Commands::Tasks => cli::request::tasks(&state, as_user, json).await,
        Commands::Audit { request, limit } => cli::admin::audit(&state, request, limit, json).await,
        Commands::Stats => cli::admin::stats(&state, json).await,
        Commands::Sweep => cli::admin::sweep(&state, json).await,
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    signoff_observe::shutdown_tracing();
    result
}

/// Run the HTTP server with the SLA sweep and notifier alongside it.
async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let cancel = CancellationToken::new();
    let notifier = notify::spawn(&state.events, cancel.clone());

    let sweep_interval = state.config.sla.sweep_interval_secs;
    let sweeper = if sweep_interval > 0 {
        let sweeper = state.sweeper.clone();
        let token = cancel.clone();
        Some(tokio::spawn(async move {
            sweeper.run(Duration::from_secs(sweep_interval), token).await;
        }))
    } else {
        tracing::info!("SLA sweep disabled (sla.sweep_interval_secs = 0)");
        None
    };

    println!(
        "  {} Signoff API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());
    tracing::info!(%addr, sweep_interval, "server started");

    let db_pool = state.db_pool.clone();
    let router = http::router::build_router(state);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cancel.cancel();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::warn!("SLA sweep task ended abnormally: {e}");
        }
    }
    match notifier.await {
        Ok(delivered) => tracing::debug!(delivered, "notifier drained"),
        Err(e) => tracing::warn!("notifier task ended abnormally: {e}"),
    }

    db_pool.close().await;

    served?;
    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping server...");
}
