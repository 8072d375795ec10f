//! SQLite submission repository implementation.
//!
//! Template maps, row id lists and exposed options are stored as JSON text.

use bioflow_core::repository::submission::{SubmissionFilter, SubmissionRepository};
use bioflow_types::error::RepositoryError;
use bioflow_types::submission::Submission;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_enum, parse_uuid, query_err, to_json};

const COLUMNS: &str = "id, name, description, workflow_id, workflow_version_id, workspace_id, \
    data_model_id, data_model_row_ids, submission_type, inputs, outputs, exposed_options, \
    status, start_time, finish_time, deleted_at";

pub struct SqliteSubmissionRepository {
    pool: DatabasePool,
}

impl SqliteSubmissionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct SubmissionRow {
    id: String,
    name: String,
    description: Option<String>,
    workflow_id: String,
    workflow_version_id: String,
    workspace_id: String,
    data_model_id: Option<String>,
    data_model_row_ids: String,
    submission_type: String,
    inputs: String,
    outputs: String,
    exposed_options: String,
    status: String,
    start_time: String,
    finish_time: Option<String>,
    deleted_at: Option<String>,
}

impl SubmissionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            workflow_id: row.try_get("workflow_id")?,
            workflow_version_id: row.try_get("workflow_version_id")?,
            workspace_id: row.try_get("workspace_id")?,
            data_model_id: row.try_get("data_model_id")?,
            data_model_row_ids: row.try_get("data_model_row_ids")?,
            submission_type: row.try_get("submission_type")?,
            inputs: row.try_get("inputs")?,
            outputs: row.try_get("outputs")?,
            exposed_options: row.try_get("exposed_options")?,
            status: row.try_get("status")?,
            start_time: row.try_get("start_time")?,
            finish_time: row.try_get("finish_time")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }

    fn into_submission(self) -> Result<Submission, RepositoryError> {
        Ok(Submission {
            id: parse_uuid(&self.id)?,
            name: self.name,
            description: self.description,
            workflow_id: self.workflow_id,
            workflow_version_id: self.workflow_version_id,
            workspace_id: self.workspace_id,
            data_model_id: self.data_model_id,
            data_model_row_ids: from_json("data_model_row_ids", &self.data_model_row_ids)?,
            submission_type: parse_enum("submission type", &self.submission_type)?,
            inputs: from_json("inputs", &self.inputs)?,
            outputs: from_json("outputs", &self.outputs)?,
            exposed_options: from_json("exposed_options", &self.exposed_options)?,
            status: parse_enum("submission status", &self.status)?,
            start_time: parse_datetime(&self.start_time)?,
            finish_time: self.finish_time.as_deref().map(parse_datetime).transpose()?,
            deleted_at: self.deleted_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

impl SubmissionRepository for SqliteSubmissionRepository {
    async fn save(&self, submission: &Submission) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO submissions
               (id, name, description, workflow_id, workflow_version_id, workspace_id,
                data_model_id, data_model_row_ids, submission_type, inputs, outputs,
                exposed_options, status, start_time, finish_time, deleted_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 workflow_id = excluded.workflow_id,
                 workflow_version_id = excluded.workflow_version_id,
                 data_model_id = excluded.data_model_id,
                 data_model_row_ids = excluded.data_model_row_ids,
                 submission_type = excluded.submission_type,
                 inputs = excluded.inputs,
                 outputs = excluded.outputs,
                 exposed_options = excluded.exposed_options,
                 status = excluded.status,
                 finish_time = excluded.finish_time,
                 deleted_at = COALESCE(submissions.deleted_at, excluded.deleted_at)"#,
        )
        .bind(submission.id.to_string())
        .bind(&submission.name)
        .bind(&submission.description)
        .bind(&submission.workflow_id)
        .bind(&submission.workflow_version_id)
        .bind(&submission.workspace_id)
        .bind(&submission.data_model_id)
        .bind(to_json(&submission.data_model_row_ids)?)
        .bind(submission.submission_type.as_str())
        .bind(to_json(&submission.inputs)?)
        .bind(to_json(&submission.outputs)?)
        .bind(to_json(&submission.exposed_options)?)
        .bind(submission.status.as_str())
        .bind(format_datetime(&submission.start_time))
        .bind(submission.finish_time.as_ref().map(format_datetime))
        .bind(submission.deleted_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Submission>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM submissions WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(SubmissionRow::from_row(&row).map_err(query_err)?.into_submission()?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>, RepositoryError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {COLUMNS} FROM submissions WHERE 1 = 1"));
        if !filter.include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        if let Some(ws) = &filter.workspace_id {
            qb.push(" AND workspace_id = ").push_bind(ws.clone());
        }
        if let Some(wf) = &filter.workflow_id {
            qb.push(" AND workflow_id = ").push_bind(wf.clone());
        }
        if let Some(name) = &filter.name {
            qb.push(" AND name = ").push_bind(name.clone());
        }
        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut separated = qb.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            qb.push(")");
        }
        if let Some(word) = filter.search_word.as_deref().filter(|w| !w.is_empty()) {
            qb.push(" AND name LIKE ").push_bind(format!("%{word}%"));
        }
        qb.push(" ORDER BY start_time DESC, id DESC LIMIT ")
            .push_bind(filter.limit.map(i64::from).unwrap_or(-1))
            .push(" OFFSET ")
            .push_bind(i64::from(filter.offset));

        let rows = qb.build().fetch_all(&self.pool.reader).await.map_err(query_err)?;
        rows.iter()
            .map(|row| SubmissionRow::from_row(row).map_err(query_err)?.into_submission())
            .collect()
    }

    async fn soft_delete(&self, id: &Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE submissions SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
            .bind(format_datetime(&at))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_types::submission::{ExposedOptions, SubmissionStatus, SubmissionType, Template};
    use serde_json::json;

    use crate::sqlite::test_pool;

    fn sample(name: &str, workspace_id: &str) -> Submission {
        let mut inputs = Template::new();
        inputs.insert("wf.reads".into(), json!("this.fastq"));
        Submission {
            id: Uuid::now_v7(),
            name: name.into(),
            description: Some("align reads".into()),
            workflow_id: "wf-1".into(),
            workflow_version_id: "v-1".into(),
            workspace_id: workspace_id.into(),
            data_model_id: Some("t-sample".into()),
            data_model_row_ids: vec!["s1".into(), "s2".into()],
            submission_type: SubmissionType::DataModel,
            inputs,
            outputs: Template::new(),
            exposed_options: ExposedOptions { read_from_cache: true },
            status: SubmissionStatus::Pending,
            start_time: Utc::now(),
            finish_time: None,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let repo = SqliteSubmissionRepository::new(test_pool().await);
        let mut submission = sample("align", "ws-1");
        repo.save(&submission).await.unwrap();

        submission.status = SubmissionStatus::Running;
        repo.save(&submission).await.unwrap();

        let loaded = repo.get(&submission.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Running);
        assert_eq!(loaded.data_model_row_ids, vec!["s1", "s2"]);
        assert!(loaded.exposed_options.read_from_cache);
        assert_eq!(loaded.inputs["wf.reads"], json!("this.fastq"));
    }

    #[tokio::test]
    async fn test_list_filters_and_hides_deleted() {
        let repo = SqliteSubmissionRepository::new(test_pool().await);
        let first = sample("align-a", "ws-1");
        let second = sample("call-b", "ws-1");
        let other = sample("align-c", "ws-2");
        for s in [&first, &second, &other] {
            repo.save(s).await.unwrap();
        }

        let found = repo
            .list(&SubmissionFilter {
                search_word: Some("ALIGN".into()),
                ..SubmissionFilter::workspace("ws-1")
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, first.id);

        assert!(repo.soft_delete(&first.id, Utc::now()).await.unwrap());
        assert!(!repo.soft_delete(&first.id, Utc::now()).await.unwrap());
        let visible = repo.list(&SubmissionFilter::workspace("ws-1")).await.unwrap();
        assert_eq!(visible.len(), 1);
        let all = repo
            .list(&SubmissionFilter {
                include_deleted: true,
                ..SubmissionFilter::workspace("ws-1")
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_save_does_not_undelete() {
        let repo = SqliteSubmissionRepository::new(test_pool().await);
        let mut submission = sample("align", "ws-1");
        repo.save(&submission).await.unwrap();
        repo.soft_delete(&submission.id, Utc::now()).await.unwrap();

        submission.status = SubmissionStatus::Cancelling;
        repo.save(&submission).await.unwrap();
        assert!(repo.get(&submission.id).await.unwrap().unwrap().deleted_at.is_some());

        assert!(repo.delete(&submission.id).await.unwrap());
        assert!(repo.get(&submission.id).await.unwrap().is_none());
    }
}
