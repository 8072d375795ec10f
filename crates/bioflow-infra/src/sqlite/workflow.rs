//! SQLite workflow catalog implementation.
//!
//! Versions and their source files cascade with the workflow row.

use bioflow_core::repository::workflow::WorkflowRepository;
use bioflow_types::error::RepositoryError;
use bioflow_types::workflow::{Workflow, WorkflowFile, WorkflowVersion};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_err};

pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn workflow_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Workflow, RepositoryError> {
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(Workflow {
        id: row.try_get("id").map_err(query_err)?,
        workspace_id: row.try_get("workspace_id").map_err(query_err)?,
        name: row.try_get("name").map_err(query_err)?,
        latest_version_id: row.try_get("latest_version_id").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
    })
}

fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowVersion, RepositoryError> {
    let created_at: String = row.try_get("created_at").map_err(query_err)?;
    Ok(WorkflowVersion {
        id: row.try_get("id").map_err(query_err)?,
        workflow_id: row.try_get("workflow_id").map_err(query_err)?,
        language: row.try_get("language").map_err(query_err)?,
        language_version: row.try_get("language_version").map_err(query_err)?,
        main_workflow_path: row.try_get("main_workflow_path").map_err(query_err)?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, workspace_id, name, latest_version_id, created_at FROM workflows WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(workflow_from_row).transpose()
    }

    async fn get_version(&self, id: &str) -> Result<Option<WorkflowVersion>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, workflow_id, language, language_version, main_workflow_path, created_at \
             FROM workflow_versions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(version_from_row).transpose()
    }

    async fn list_files(&self, version_id: &str) -> Result<Vec<WorkflowFile>, RepositoryError> {
        let rows = sqlx::query("SELECT path, content FROM workflow_files WHERE version_id = ? ORDER BY path ASC")
            .bind(version_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                Ok(WorkflowFile {
                    path: row.try_get("path").map_err(query_err)?,
                    content: row.try_get("content").map_err(query_err)?,
                })
            })
            .collect()
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO workflows (id, workspace_id, name, latest_version_id, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 latest_version_id = excluded.latest_version_id"#,
        )
        .bind(&workflow.id)
        .bind(&workflow.workspace_id)
        .bind(&workflow.name)
        .bind(&workflow.latest_version_id)
        .bind(format_datetime(&workflow.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn save_version(&self, version: &WorkflowVersion, files: &[WorkflowFile]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query(
            r#"INSERT INTO workflow_versions
               (id, workflow_id, language, language_version, main_workflow_path, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 language = excluded.language,
                 language_version = excluded.language_version,
                 main_workflow_path = excluded.main_workflow_path"#,
        )
        .bind(&version.id)
        .bind(&version.workflow_id)
        .bind(&version.language)
        .bind(&version.language_version)
        .bind(&version.main_workflow_path)
        .bind(format_datetime(&version.created_at))
        .execute(&mut *tx)
        .await
        .map_err(query_err)?;

        sqlx::query("DELETE FROM workflow_files WHERE version_id = ?")
            .bind(&version.id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        for file in files {
            sqlx::query("INSERT INTO workflow_files (version_id, path, content) VALUES (?, ?, ?)")
                .bind(&version.id)
                .bind(&file.path)
                .bind(&file.content)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(())
    }

    async fn delete_workflow(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = ?")
            .bind(id)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }
}
