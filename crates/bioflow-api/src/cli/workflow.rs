//! Workflow catalog CLI subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use console::style;

use bioflow_core::service::RegisterWorkflowCommand;
use bioflow_types::workflow::WorkflowFile;

use super::print_json;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register a workflow, or a new version of an existing one.
    Add {
        /// Workflow name.
        #[arg(long)]
        name: String,

        /// Add a version to this workflow instead of creating a new one.
        #[arg(long = "workflow-id")]
        workflow_id: Option<String>,

        #[arg(long, default_value = "WDL")]
        language: String,

        #[arg(long = "language-version", default_value = "1.0")]
        language_version: String,

        /// Entry file, relative to `--root`.
        #[arg(long)]
        main: String,

        /// Directory the file paths are relative to.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Workflow source files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Delete a workflow and every submission that uses it.
    #[command(alias = "rm")]
    Delete { id: String },
}

pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    workspace_id: &str,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Add {
            name,
            workflow_id,
            language,
            language_version,
            main,
            root,
            files,
        } => {
            let files = read_files(&root, &files).await?;
            let command = RegisterWorkflowCommand {
                workspace_id: workspace_id.to_string(),
                workflow_id,
                name,
                language,
                language_version,
                main_workflow_path: main,
                files,
            };
            add_workflow(state, command, json).await
        }
        WorkflowCommand::Delete { id } => delete_workflow(state, workspace_id, &id, json).await,
    }
}

/// Path of `file` relative to `root`, with `/` separators.
fn relative_path(root: &Path, file: &Path) -> Result<String> {
    use std::path::Component;

    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("'{}' is not inside {}", file.display(), root.display())
            }
        }
    }
    if parts.is_empty() {
        bail!("'{}' does not name a file", file.display());
    }
    Ok(parts.join("/"))
}

async fn read_files(root: &Path, files: &[PathBuf]) -> Result<Vec<WorkflowFile>> {
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let on_disk = if file.is_absolute() { file.clone() } else { root.join(file) };
        let content = tokio::fs::read_to_string(&on_disk)
            .await
            .with_context(|| format!("failed to read {}", on_disk.display()))?;
        out.push(WorkflowFile {
            path: relative_path(root, file)?,
            content,
        });
    }
    Ok(out)
}

async fn add_workflow(state: &AppState, command: RegisterWorkflowCommand, json: bool) -> Result<()> {
    let name = command.name.clone();
    let workflow = state
        .catalog_service
        .register_workflow(command)
        .await
        .with_context(|| format!("failed to register workflow '{name}'"))?;

    if json {
        return print_json(&workflow);
    }

    println!();
    println!(
        "  {} Workflow '{}' registered",
        style("ok").green(),
        style(&workflow.name).cyan()
    );
    println!("     id:      {}", style(&workflow.id).dim());
    println!(
        "     version: {}",
        style(workflow.latest_version_id.as_deref().unwrap_or("-")).dim()
    );
    println!();
    Ok(())
}

async fn delete_workflow(state: &AppState, workspace_id: &str, id: &str, json: bool) -> Result<()> {
    state
        .catalog_service
        .delete_workflow(workspace_id, id)
        .await
        .with_context(|| format!("failed to delete workflow '{id}'"))?;

    if json {
        print_json(&serde_json::json!({ "deleted": id }))?;
    } else {
        println!();
        println!("  {} Workflow {} deleted", style("ok").green(), style(id).cyan());
        println!("     {}", style("Its submissions are removed in the background.").dim());
        println!();
    }
    Ok(())
}

/// Publish the workspace deletion. Requires `--force`.
pub async fn delete_workspace(state: &AppState, workspace_id: &str, force: bool, json: bool) -> Result<()> {
    if !force {
        bail!("refusing to delete workspace '{workspace_id}' without --force");
    }
    state.catalog_service.delete_workspace(workspace_id).await?;

    if json {
        print_json(&serde_json::json!({ "deleted_workspace": workspace_id }))?;
    } else {
        println!();
        println!(
            "  {} Workspace '{}' scheduled for deletion",
            style("ok").green(),
            style(workspace_id).cyan()
        );
        println!();
    }
    Ok(())
}
