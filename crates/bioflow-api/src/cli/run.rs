//! Run and task CLI subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use bioflow_core::service::{CancelRunCommand, ListRunsQuery, ListTasksQuery};
use bioflow_types::run::RunStatus;

use super::{format_optional_time, format_time, print_json, status_cell};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum RunCommand {
    /// List the runs of a submission.
    #[command(alias = "ls")]
    List {
        submission_id: Uuid,

        /// Filter by status (comma separated).
        #[arg(long = "status", value_delimiter = ',')]
        statuses: Vec<RunStatus>,

        /// Substring of the run name.
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one run, including its inputs and outputs.
    Show { submission_id: Uuid, run_id: Uuid },

    /// Request cancellation of a single run.
    Cancel { submission_id: Uuid, run_id: Uuid },
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// List the tasks the engine reported for a run.
    #[command(alias = "ls")]
    List { submission_id: Uuid, run_id: Uuid },
}

pub async fn handle_run_command(cmd: RunCommand, state: &AppState, workspace_id: &str, json: bool) -> Result<()> {
    match cmd {
        RunCommand::List {
            submission_id,
            statuses,
            search,
        } => {
            let query = ListRunsQuery {
                workspace_id: workspace_id.to_string(),
                submission_id,
                statuses,
                search_word: search,
            };
            list_runs(state, query, json).await
        }
        RunCommand::Show { submission_id, run_id } => {
            show_run(state, workspace_id, &submission_id, &run_id, json).await
        }
        RunCommand::Cancel { submission_id, run_id } => {
            cancel_run(state, workspace_id, submission_id, run_id, json).await
        }
    }
}

pub async fn handle_task_command(cmd: TaskCommand, state: &AppState, workspace_id: &str, json: bool) -> Result<()> {
    match cmd {
        TaskCommand::List { submission_id, run_id } => {
            list_tasks(state, workspace_id, submission_id, run_id, json).await
        }
    }
}

async fn list_runs(state: &AppState, query: ListRunsQuery, json: bool) -> Result<()> {
    let submission_id = query.submission_id;
    let runs = state
        .run_service
        .list_runs(query)
        .await
        .with_context(|| format!("failed to list runs of submission '{submission_id}'"))?;

    if json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!();
        println!("  {} No runs for {}.", style("i").blue().bold(), style(submission_id).cyan());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Engine Run").fg(Color::White),
        Cell::new("Started").fg(Color::White),
        Cell::new("Finished").fg(Color::White),
    ]);

    for run in &runs {
        table.add_row(vec![
            Cell::new(run.id).fg(Color::DarkGrey),
            Cell::new(&run.name).fg(Color::Cyan),
            status_cell(run.status.as_str()),
            Cell::new(run.engine_run_id.as_deref().unwrap_or("-")),
            Cell::new(format_time(&run.start_time)),
            Cell::new(format_optional_time(run.finish_time.as_ref())),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn show_run(
    state: &AppState,
    workspace_id: &str,
    submission_id: &Uuid,
    run_id: &Uuid,
    json: bool,
) -> Result<()> {
    let run = state
        .run_service
        .get_run(workspace_id, submission_id, run_id)
        .await
        .with_context(|| format!("Run '{run_id}' not found"))?;

    if json {
        return print_json(&run);
    }

    println!();
    println!("  {} {}", style(&run.name).cyan().bold(), style(run.id).dim());
    println!();
    println!("  {:<12} {}", style("Status").bold(), run.status);
    println!(
        "  {:<12} {}",
        style("Engine run").bold(),
        run.engine_run_id.as_deref().unwrap_or("-")
    );
    println!("  {:<12} {}", style("Started").bold(), format_time(&run.start_time));
    println!(
        "  {:<12} {}",
        style("Finished").bold(),
        format_optional_time(run.finish_time.as_ref())
    );
    if let Some(message) = &run.message {
        println!("  {:<12} {}", style("Message").bold(), style(message).yellow());
    }
    if let Some(log) = &run.log {
        println!("  {:<12} {}", style("Log").bold(), log);
    }
    println!();
    println!("  {}", style("Inputs").bold());
    println!("{}", indent(&serde_json::to_string_pretty(&run.inputs)?));
    if let Some(outputs) = &run.outputs {
        println!("  {}", style("Outputs").bold());
        println!("{}", indent(&serde_json::to_string_pretty(outputs)?));
    }
    println!();
    Ok(())
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("    {line}")).collect::<Vec<_>>().join("\n")
}

async fn cancel_run(state: &AppState, workspace_id: &str, submission_id: Uuid, run_id: Uuid, json: bool) -> Result<()> {
    state
        .run_service
        .cancel_run(CancelRunCommand {
            workspace_id: workspace_id.to_string(),
            submission_id,
            run_id,
        })
        .await
        .with_context(|| format!("failed to cancel run '{run_id}'"))?;

    if json {
        print_json(&serde_json::json!({ "cancelling": run_id }))?;
    } else {
        println!();
        println!("  {} Cancellation requested for run {}", style("ok").green(), style(run_id).cyan());
        println!();
    }
    Ok(())
}

async fn list_tasks(state: &AppState, workspace_id: &str, submission_id: Uuid, run_id: Uuid, json: bool) -> Result<()> {
    let tasks = state
        .run_service
        .list_tasks(ListTasksQuery {
            workspace_id: workspace_id.to_string(),
            submission_id,
            run_id,
        })
        .await
        .with_context(|| format!("failed to list tasks of run '{run_id}'"))?;

    if json {
        return print_json(&tasks);
    }

    if tasks.is_empty() {
        println!();
        println!("  {} No tasks reported yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Task").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Stdout").fg(Color::White),
        Cell::new("Stderr").fg(Color::White),
    ]);
    for task in &tasks {
        table.add_row(vec![
            Cell::new(&task.name).fg(Color::Cyan),
            status_cell(task.status.as_str()),
            Cell::new(&task.stdout).fg(Color::DarkGrey),
            Cell::new(&task.stderr).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
