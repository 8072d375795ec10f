//! CLI command definitions for the `bioflow` binary.
//!
//! Uses clap derive macros. Commands follow a noun-verb pattern
//! (e.g., `bioflow submission create`, `bioflow run list`).

pub mod run;
pub mod serve;
pub mod submission;
pub mod table;
pub mod workflow;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};

/// Run bioinformatics workflows over data-model tables.
#[derive(Parser)]
#[command(name = "bioflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Workspace the command operates on.
    #[arg(long, global = true, env = "BIOFLOW_WORKSPACE", default_value = "default")]
    pub workspace: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the event bus workers until Ctrl+C.
    Serve {
        /// Override the configured number of workers.
        #[arg(long)]
        workers: Option<usize>,

        /// Export spans to stdout through OpenTelemetry.
        #[arg(long)]
        otel: bool,
    },

    /// Create, inspect, cancel and delete submissions.
    Submission {
        #[command(subcommand)]
        action: submission::SubmissionCommand,
    },

    /// Inspect and cancel runs of a submission.
    Run {
        #[command(subcommand)]
        action: run::RunCommand,
    },

    /// Inspect tasks of a run.
    Task {
        #[command(subcommand)]
        action: run::TaskCommand,
    },

    /// Register and delete workflows.
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Import and list data-model tables.
    Table {
        #[command(subcommand)]
        action: table::TableCommand,
    },

    /// Remove every submission of the current workspace.
    #[command(name = "delete-workspace")]
    DeleteWorkspace {
        /// Required, since this cannot be undone.
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Color a status cell by how the lifecycle ended.
pub(crate) fn status_cell(status: &str) -> Cell {
    let color = match status {
        "succeeded" | "finished" => Color::Green,
        "failed" => Color::Red,
        "running" => Color::Cyan,
        "cancelling" | "cancelled" => Color::Yellow,
        _ => Color::DarkGrey,
    };
    Cell::new(status).fg(color)
}

pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn format_optional_time(time: Option<&DateTime<Utc>>) -> String {
    time.map(format_time).unwrap_or_else(|| "-".to_string())
}

/// Print `value` as pretty JSON.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_list_with_statuses() {
        let cli = Cli::try_parse_from([
            "bioflow",
            "--workspace",
            "ws-1",
            "run",
            "list",
            "0190a5f0-0000-7000-8000-000000000001",
            "--status",
            "running,failed",
        ])
        .unwrap();
        assert_eq!(cli.workspace, "ws-1");
        match cli.command {
            Commands::Run {
                action: run::RunCommand::List { statuses, .. },
            } => {
                assert_eq!(
                    statuses,
                    vec![bioflow_types::run::RunStatus::Running, bioflow_types::run::RunStatus::Failed]
                );
            }
            _ => panic!("expected run list"),
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = Cli::try_parse_from([
            "bioflow",
            "submission",
            "list",
            "--status",
            "sleeping",
        ]);
        assert!(result.is_err());
    }
}
