//! SQLite run repository implementation.

use std::collections::BTreeMap;

use bioflow_core::repository::run::{RunFilter, RunRepository};
use bioflow_types::error::RepositoryError;
use bioflow_types::run::{Run, RunStatus};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_enum, parse_uuid, query_err, to_json};

const COLUMNS: &str =
    "id, name, submission_id, inputs, outputs, engine_run_id, status, log, message, start_time, finish_time";

pub struct SqliteRunRepository {
    pool: DatabasePool,
}

impl SqliteRunRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct RunRow {
    id: String,
    name: String,
    submission_id: String,
    inputs: String,
    outputs: Option<String>,
    engine_run_id: Option<String>,
    status: String,
    log: Option<String>,
    message: Option<String>,
    start_time: String,
    finish_time: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            submission_id: row.try_get("submission_id")?,
            inputs: row.try_get("inputs")?,
            outputs: row.try_get("outputs")?,
            engine_run_id: row.try_get("engine_run_id")?,
            status: row.try_get("status")?,
            log: row.try_get("log")?,
            message: row.try_get("message")?,
            start_time: row.try_get("start_time")?,
            finish_time: row.try_get("finish_time")?,
        })
    }

    fn into_run(self) -> Result<Run, RepositoryError> {
        Ok(Run {
            id: parse_uuid(&self.id)?,
            name: self.name,
            submission_id: parse_uuid(&self.submission_id)?,
            inputs: from_json("inputs", &self.inputs)?,
            outputs: self.outputs.as_deref().map(|o| from_json("outputs", o)).transpose()?,
            engine_run_id: self.engine_run_id,
            status: parse_enum("run status", &self.status)?,
            log: self.log,
            message: self.message,
            start_time: parse_datetime(&self.start_time)?,
            finish_time: self.finish_time.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

impl RunRepository for SqliteRunRepository {
    async fn save(&self, run: &Run) -> Result<(), RepositoryError> {
        let outputs = run.outputs.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"INSERT INTO runs
               (id, name, submission_id, inputs, outputs, engine_run_id, status, log, message, start_time, finish_time)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 inputs = excluded.inputs,
                 outputs = excluded.outputs,
                 engine_run_id = excluded.engine_run_id,
                 status = excluded.status,
                 log = excluded.log,
                 message = excluded.message,
                 finish_time = excluded.finish_time"#,
        )
        .bind(run.id.to_string())
        .bind(&run.name)
        .bind(run.submission_id.to_string())
        .bind(to_json(&run.inputs)?)
        .bind(outputs)
        .bind(&run.engine_run_id)
        .bind(run.status.as_str())
        .bind(&run.log)
        .bind(&run.message)
        .bind(format_datetime(&run.start_time))
        .bind(run.finish_time.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM runs WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(RunRow::from_row(&row).map_err(query_err)?.into_run()?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<Run>, RepositoryError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {COLUMNS} FROM runs WHERE 1 = 1"));
        if let Some(submission_id) = filter.submission_id {
            qb.push(" AND submission_id = ").push_bind(submission_id.to_string());
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
        qb.push(" ORDER BY name ASC");

        let rows = qb.build().fetch_all(&self.pool.reader).await.map_err(query_err)?;
        rows.iter()
            .map(|row| RunRow::from_row(row).map_err(query_err)?.into_run())
            .collect()
    }

    async fn count_by_status(&self, submission_id: &Uuid) -> Result<BTreeMap<RunStatus, u64>, RepositoryError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM runs WHERE submission_id = ? GROUP BY status")
            .bind(submission_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut counts = BTreeMap::new();
        for row in &rows {
            let status: String = row.try_get("status").map_err(query_err)?;
            let n: i64 = row.try_get("n").map_err(query_err)?;
            counts.insert(parse_enum("run status", &status)?, u64::try_from(n).unwrap_or(0));
        }
        Ok(counts)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM runs WHERE id = ?")
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
    use chrono::Utc;
    use serde_json::json;

    use crate::sqlite::test_pool;

    fn sample(submission_id: Uuid, name: &str, status: RunStatus) -> Run {
        Run {
            id: Run::derive_id(submission_id, name),
            name: name.into(),
            submission_id,
            inputs: json!({"wf.reads": format!("{name}.fq")}),
            outputs: None,
            engine_run_id: None,
            status,
            log: None,
            message: None,
            start_time: Utc::now(),
            finish_time: None,
        }
    }

    #[tokio::test]
    async fn test_save_get_and_update() {
        let repo = SqliteRunRepository::new(test_pool().await);
        let submission_id = Uuid::now_v7();
        let mut run = sample(submission_id, "s1", RunStatus::Pending);
        repo.save(&run).await.unwrap();

        run.engine_run_id = Some("engine-1".into());
        run.status = RunStatus::Succeeded;
        run.outputs = Some(json!({"wf.bam": "s1.bam"}));
        run.finish_time = Some(Utc::now());
        repo.save(&run).await.unwrap();

        let loaded = repo.get(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Succeeded);
        assert_eq!(loaded.engine_run_id.as_deref(), Some("engine-1"));
        assert_eq!(loaded.outputs, Some(json!({"wf.bam": "s1.bam"})));
        assert!(loaded.finish_time.is_some());
    }

    #[tokio::test]
    async fn test_list_and_count_by_status() {
        let repo = SqliteRunRepository::new(test_pool().await);
        let submission_id = Uuid::now_v7();
        repo.save(&sample(submission_id, "s2", RunStatus::Running)).await.unwrap();
        repo.save(&sample(submission_id, "s1", RunStatus::Running)).await.unwrap();
        repo.save(&sample(submission_id, "s3", RunStatus::Failed)).await.unwrap();
        repo.save(&sample(Uuid::now_v7(), "s1", RunStatus::Failed)).await.unwrap();

        let runs = repo.list(&RunFilter::submission(submission_id)).await.unwrap();
        let names: Vec<&str> = runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2", "s3"]);

        let failed = repo
            .list(&RunFilter::submission(submission_id).with_statuses(&[RunStatus::Failed]))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);

        let counts = repo.count_by_status(&submission_id).await.unwrap();
        assert_eq!(counts.get(&RunStatus::Running), Some(&2));
        assert_eq!(counts.get(&RunStatus::Failed), Some(&1));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = SqliteRunRepository::new(test_pool().await);
        let run = sample(Uuid::now_v7(), "s1", RunStatus::Cancelled);
        repo.save(&run).await.unwrap();
        assert!(repo.delete(&run.id).await.unwrap());
        assert!(!repo.delete(&run.id).await.unwrap());
    }
}
