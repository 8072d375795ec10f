//! bioflow CLI entry point.
//!
//! Parses CLI arguments, initializes tracing, the database and services, then
//! dispatches to the command handler. `serve` runs the event bus that drives
//! submissions through their lifecycle.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (serving, otel) = match &cli.command {
        Commands::Serve { otel, .. } => (true, *otel),
        _ => (false, false),
    };
    let filter = match cli.verbose {
        0 if serving => "info",
        0 => "warn",
        1 => "info,bioflow_core=debug,bioflow_infra=debug",
        _ => "trace",
    };
    bioflow_observe::tracing_setup::init_tracing(filter, otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "bioflow", &mut std::io::stdout());
        return Ok(());
    }

    let workers = match &cli.command {
        Commands::Serve { workers, .. } => *workers,
        _ => None,
    };
    let state = AppState::init(workers).await?;
    let workspace = cli.workspace.as_str();

    let result = match cli.command {
        Commands::Serve { .. } => cli::serve::serve(&state).await,
        Commands::Submission { action } => {
            cli::submission::handle_submission_command(action, &state, workspace, cli.json).await
        }
        Commands::Run { action } => cli::run::handle_run_command(action, &state, workspace, cli.json).await,
        Commands::Task { action } => cli::run::handle_task_command(action, &state, workspace, cli.json).await,
        Commands::Workflow { action } => {
            cli::workflow::handle_workflow_command(action, &state, workspace, cli.json).await
        }
        Commands::Table { action } => cli::table::handle_table_command(action, &state, workspace, cli.json).await,
        Commands::DeleteWorkspace { force } => {
            cli::workflow::delete_workspace(&state, workspace, force, cli.json).await
        }
        Commands::Completions { .. } => Ok(()),
    };

    bioflow_observe::tracing_setup::shutdown_tracing();
    result
}
