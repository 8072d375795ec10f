//! Submission CLI subcommands.
//!
//! `create` reads a JSON document shaped like the create command. The
//! workspace comes from `--workspace` unless the document names one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use bioflow_core::service::{
    CancelSubmissionCommand, CreateSubmissionCommand, DeleteSubmissionCommand, ListSubmissionsQuery,
    SubmissionSummary,
};
use bioflow_types::submission::SubmissionStatus;

use super::{format_optional_time, format_time, print_json, status_cell};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum SubmissionCommand {
    /// Create a submission from a JSON file.
    Create {
        /// Path to the submission document.
        file: PathBuf,
    },

    /// List submissions, newest first.
    #[command(alias = "ls")]
    List {
        /// Only submissions of this workflow.
        #[arg(long)]
        workflow: Option<String>,

        /// Filter by status (comma separated).
        #[arg(long = "status", value_delimiter = ',')]
        statuses: Vec<SubmissionStatus>,

        /// Substring of the submission name.
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show one submission with its run counts.
    Show { id: Uuid },

    /// Request cancellation of every unfinished run.
    Cancel { id: Uuid },

    /// Delete a submission with its runs and tasks.
    #[command(alias = "rm")]
    Delete { id: Uuid },
}

pub async fn handle_submission_command(
    cmd: SubmissionCommand,
    state: &AppState,
    workspace_id: &str,
    json: bool,
) -> Result<()> {
    match cmd {
        SubmissionCommand::Create { file } => create_submission(state, workspace_id, &file, json).await,
        SubmissionCommand::List {
            workflow,
            statuses,
            search,
            limit,
            offset,
        } => {
            let query = ListSubmissionsQuery {
                workspace_id: workspace_id.to_string(),
                workflow_id: workflow,
                statuses,
                search_word: search,
                limit,
                offset,
            };
            list_submissions(state, query, json).await
        }
        SubmissionCommand::Show { id } => show_submission(state, workspace_id, &id, json).await,
        SubmissionCommand::Cancel { id } => cancel_submission(state, workspace_id, id, json).await,
        SubmissionCommand::Delete { id } => delete_submission(state, workspace_id, id, json).await,
    }
}

/// Parse a submission document, defaulting its workspace.
fn parse_create_command(raw: &str, workspace_id: &str) -> Result<CreateSubmissionCommand> {
    let mut doc: serde_json::Value = serde_json::from_str(raw).context("submission file is not valid JSON")?;
    let object = doc
        .as_object_mut()
        .context("submission file must contain a JSON object")?;
    object
        .entry("workspace_id")
        .or_insert_with(|| serde_json::Value::String(workspace_id.to_string()));
    serde_json::from_value(doc).context("submission file does not describe a submission")
}

async fn create_submission(state: &AppState, workspace_id: &str, file: &Path, json: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let command = parse_create_command(&raw, workspace_id)?;
    let name = command.name.clone();

    let id = state
        .submission_service
        .create_submission(command)
        .await
        .with_context(|| format!("failed to create submission '{name}'"))?;

    if json {
        print_json(&serde_json::json!({ "id": id, "name": name }))?;
    } else {
        println!();
        println!(
            "  {} Submission '{}' created",
            style("ok").green(),
            style(&name).cyan()
        );
        println!("     id: {}", style(id).dim());
        println!(
            "     {}",
            style("Runs are created once `bioflow serve` processes it.").dim()
        );
        println!();
    }
    Ok(())
}

async fn list_submissions(state: &AppState, query: ListSubmissionsQuery, json: bool) -> Result<()> {
    let items = state.submission_service.list_submissions(query).await?;

    if json {
        return print_json(&items);
    }

    if items.is_empty() {
        println!();
        println!("  {} No submissions found.", style("i").blue().bold());
        println!("     Create one with: bioflow submission create <file.json>");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Workflow").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Runs").fg(Color::White),
        Cell::new("Started").fg(Color::White),
    ]);

    for item in &items {
        let sub = &item.submission;
        table.add_row(vec![
            Cell::new(sub.id).fg(Color::DarkGrey),
            Cell::new(&sub.name).fg(Color::Cyan),
            Cell::new(&sub.workflow_id),
            status_cell(sub.status.as_str()),
            Cell::new(run_counts_label(item)),
            Cell::new(format_time(&sub.start_time)),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

/// `2 succeeded, 1 running`
fn run_counts_label(item: &SubmissionSummary) -> String {
    if item.run_counts.is_empty() {
        return "-".to_string();
    }
    item.run_counts
        .iter()
        .map(|(status, count)| format!("{count} {status}"))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn show_submission(state: &AppState, workspace_id: &str, id: &Uuid, json: bool) -> Result<()> {
    let item = state
        .submission_service
        .get_submission(workspace_id, id)
        .await
        .with_context(|| format!("Submission '{id}' not found"))?;

    if json {
        return print_json(&item);
    }

    let sub = &item.submission;
    println!();
    println!("  {} {}", style(&sub.name).cyan().bold(), style(sub.id).dim());
    if let Some(description) = &sub.description {
        println!("  {description}");
    }
    println!();
    println!("  {:<12} {}", style("Status").bold(), sub.status);
    println!("  {:<12} {} ({})", style("Workflow").bold(), sub.workflow_id, sub.workflow_version_id);
    println!("  {:<12} {}", style("Type").bold(), sub.submission_type.as_str());
    if let Some(table_id) = &sub.data_model_id {
        println!(
            "  {:<12} {} [{} rows]",
            style("Table").bold(),
            table_id,
            sub.data_model_row_ids.len()
        );
    }
    println!("  {:<12} {}", style("Runs").bold(), run_counts_label(&item));
    println!("  {:<12} {}", style("Started").bold(), format_time(&sub.start_time));
    println!(
        "  {:<12} {}",
        style("Finished").bold(),
        format_optional_time(sub.finish_time.as_ref())
    );
    println!();
    Ok(())
}

async fn cancel_submission(state: &AppState, workspace_id: &str, id: Uuid, json: bool) -> Result<()> {
    state
        .submission_service
        .cancel_submission(CancelSubmissionCommand {
            workspace_id: workspace_id.to_string(),
            submission_id: id,
        })
        .await
        .with_context(|| format!("failed to cancel submission '{id}'"))?;

    if json {
        print_json(&serde_json::json!({ "cancelling": id }))?;
    } else {
        println!();
        println!("  {} Cancellation requested for {}", style("ok").green(), style(id).cyan());
        println!();
    }
    Ok(())
}

async fn delete_submission(state: &AppState, workspace_id: &str, id: Uuid, json: bool) -> Result<()> {
    state
        .submission_service
        .delete_submission(DeleteSubmissionCommand {
            workspace_id: workspace_id.to_string(),
            submission_id: id,
        })
        .await
        .with_context(|| format!("failed to delete submission '{id}'"))?;

    if json {
        print_json(&serde_json::json!({ "deleted": id }))?;
    } else {
        println!();
        println!("  {} Submission {} deleted", style("ok").green(), style(id).cyan());
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_types::submission::SubmissionType;

    const DOC: &str = r#"{
        "name": "align-batch-1",
        "workflow_id": "wf-1",
        "submission_type": "data_model",
        "data_model_id": "t-sample",
        "data_model_row_ids": ["s1", "s2"],
        "inputs": {"wf.reads": "this.fastq"}
    }"#;

    #[test]
    fn test_parse_create_command_defaults_workspace() {
        let command = parse_create_command(DOC, "ws-cli").unwrap();
        assert_eq!(command.workspace_id, "ws-cli");
        assert_eq!(command.submission_type, SubmissionType::DataModel);
        assert_eq!(command.data_model_row_ids, vec!["s1", "s2"]);
        assert!(command.workflow_version_id.is_none());
    }

    #[test]
    fn test_parse_create_command_keeps_explicit_workspace() {
        let doc = DOC.replacen('{', r#"{"workspace_id": "ws-doc","#, 1);
        let command = parse_create_command(&doc, "ws-cli").unwrap();
        assert_eq!(command.workspace_id, "ws-doc");
    }

    #[test]
    fn test_parse_create_command_rejects_non_objects() {
        assert!(parse_create_command("[1, 2]", "ws").is_err());
        assert!(parse_create_command("{", "ws").is_err());
        assert!(parse_create_command(r#"{"name": "x"}"#, "ws").is_err());
    }
}
