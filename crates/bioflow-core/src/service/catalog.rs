//! Workflow catalog and data-model table administration.
//!
//! Deleting a workflow or a workspace only publishes the fact; the cascade
//! over submissions happens in the saga.

use std::sync::Arc;

use bioflow_types::data_model::{DataModel, DataModelType, SET_SUFFIX};
use bioflow_types::error::AppError;
use bioflow_types::event::{Event, WorkflowDeletedEvent, WorkspaceDeletedEvent};
use bioflow_types::workflow::{Workflow, WorkflowFile, WorkflowVersion};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::data_model::DataModelService;
use crate::event::EventPublisher;
use crate::repository::workflow::WorkflowRepository;

/// Add a workflow, or a new version of an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorkflowCommand {
    pub workspace_id: String,
    /// Existing workflow to add a version to. A new workflow is created when absent.
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub name: String,
    pub language: String,
    pub language_version: String,
    pub main_workflow_path: String,
    pub files: Vec<WorkflowFile>,
}

/// Load a whole table. `headers[0]` is the row id column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportTableCommand {
    pub workspace_id: String,
    pub name: String,
    pub kind: DataModelType,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub struct CatalogService<W, D> {
    workflows: Arc<W>,
    data_model: Arc<D>,
    publisher: Arc<dyn EventPublisher>,
}

impl<W: WorkflowRepository, D: DataModelService> CatalogService<W, D> {
    pub fn new(workflows: Arc<W>, data_model: Arc<D>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            workflows,
            data_model,
            publisher,
        }
    }

    /// Returns the stored workflow, whose `latest_version_id` is the new version.
    pub async fn register_workflow(&self, command: RegisterWorkflowCommand) -> Result<Workflow, AppError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Invalid("workflow name cannot be empty".to_string()));
        }
        if !command.files.iter().any(|f| f.path == command.main_workflow_path) {
            return Err(AppError::Invalid(format!(
                "main workflow '{}' is not among the uploaded files",
                command.main_workflow_path
            )));
        }

        let now = Utc::now();
        let mut workflow = match command.workflow_id.as_deref() {
            Some(id) => self
                .workflows
                .get_workflow(id)
                .await?
                .filter(|w| w.workspace_id == command.workspace_id)
                .ok_or_else(|| AppError::NotFound(format!("workflow '{id}'")))?,
            None => Workflow {
                id: Uuid::now_v7().to_string(),
                workspace_id: command.workspace_id.clone(),
                name,
                latest_version_id: None,
                created_at: now,
            },
        };

        let version = WorkflowVersion {
            id: Uuid::now_v7().to_string(),
            workflow_id: workflow.id.clone(),
            language: command.language,
            language_version: command.language_version,
            main_workflow_path: command.main_workflow_path,
            created_at: now,
        };
        workflow.latest_version_id = Some(version.id.clone());

        self.workflows.save_workflow(&workflow).await?;
        self.workflows.save_version(&version, &command.files).await?;
        info!(
            workflow_id = %workflow.id,
            version_id = %version.id,
            files = command.files.len(),
            "workflow version registered"
        );
        Ok(workflow)
    }

    pub async fn delete_workflow(&self, workspace_id: &str, workflow_id: &str) -> Result<(), AppError> {
        let workflow = self
            .workflows
            .get_workflow(workflow_id)
            .await?
            .filter(|w| w.workspace_id == workspace_id)
            .ok_or_else(|| AppError::NotFound(format!("workflow '{workflow_id}'")))?;

        self.workflows.delete_workflow(&workflow.id).await?;
        self.publisher
            .publish(Event::WorkflowDeleted(WorkflowDeletedEvent {
                workspace_id: workspace_id.to_string(),
                workflow_id: workflow.id.clone(),
            }))
            .await?;
        info!(workflow_id = %workflow.id, workspace_id, "workflow deleted");
        Ok(())
    }

    /// Announce that a workspace is gone so its submissions get removed.
    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<(), AppError> {
        self.publisher
            .publish(Event::WorkspaceDeleted(WorkspaceDeletedEvent {
                workspace_id: workspace_id.to_string(),
            }))
            .await?;
        info!(workspace_id, "workspace deleted");
        Ok(())
    }

    /// Create or replace a table. Returns the table id.
    pub async fn import_table(&self, command: ImportTableCommand) -> Result<String, AppError> {
        let table = DataModel {
            id: Uuid::now_v7().to_string(),
            workspace_id: command.workspace_id,
            name: command.name,
            kind: command.kind,
            headers: command.headers,
        };
        validate_table(&table, &command.rows)?;

        let existing = self
            .data_model
            .list_tables(&table.workspace_id, Some(&table.name), &[])
            .await?
            .into_iter()
            .find(|t| t.name == table.name);
        let table = match existing {
            Some(found) => DataModel { id: found.id, ..table },
            None => table,
        };

        self.data_model.import_table(&table, &command.rows).await?;
        info!(
            table_id = %table.id,
            name = %table.name,
            kind = %table.kind,
            rows = command.rows.len(),
            "table imported"
        );
        Ok(table.id)
    }

    pub async fn list_tables(&self, workspace_id: &str, search_word: Option<&str>) -> Result<Vec<DataModel>, AppError> {
        Ok(self.data_model.list_tables(workspace_id, search_word, &[]).await?)
    }
}

fn validate_table(table: &DataModel, rows: &[Vec<String>]) -> Result<(), AppError> {
    if table.name.trim().is_empty() {
        return Err(AppError::Invalid("table name cannot be empty".to_string()));
    }
    let expected_id = table.id_header();
    if table.headers.first() != Some(&expected_id) {
        return Err(AppError::Invalid(format!(
            "first header of '{}' must be '{expected_id}'",
            table.name
        )));
    }
    if table.kind == DataModelType::EntitySet && table.member_table_name().is_none() {
        return Err(AppError::Invalid(format!(
            "entity set '{}' must end in '{SET_SUFFIX}'",
            table.name
        )));
    }
    if let Some(row) = rows.iter().find(|r| r.len() != table.headers.len()) {
        return Err(AppError::Invalid(format!(
            "row '{}' has {} cells, expected {}",
            row.first().map(String::as_str).unwrap_or_default(),
            row.len(),
            table.headers.len()
        )));
    }
    Ok(())
}
