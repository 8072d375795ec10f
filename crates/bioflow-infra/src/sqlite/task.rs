//! SQLite task repository implementation.

use bioflow_core::repository::task::TaskRepository;
use bioflow_types::error::RepositoryError;
use bioflow_types::run::Task;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_enum, parse_uuid, query_err};

pub struct SqliteTaskRepository {
    pool: DatabasePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Task, RepositoryError> {
    let run_id: String = row.try_get("run_id").map_err(query_err)?;
    let status: String = row.try_get("status").map_err(query_err)?;
    let start_time: String = row.try_get("start_time").map_err(query_err)?;
    let finish_time: Option<String> = row.try_get("finish_time").map_err(query_err)?;
    Ok(Task {
        name: row.try_get("name").map_err(query_err)?,
        run_id: parse_uuid(&run_id)?,
        status: parse_enum("task status", &status)?,
        stdout: row.try_get("stdout").map_err(query_err)?,
        stderr: row.try_get("stderr").map_err(query_err)?,
        start_time: parse_datetime(&start_time)?,
        finish_time: finish_time.as_deref().map(parse_datetime).transpose()?,
    })
}

impl TaskRepository for SqliteTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO tasks (run_id, name, status, stdout, stderr, start_time, finish_time)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(run_id, name) DO UPDATE SET
                 status = excluded.status,
                 stdout = excluded.stdout,
                 stderr = excluded.stderr,
                 finish_time = excluded.finish_time"#,
        )
        .bind(task.run_id.to_string())
        .bind(&task.name)
        .bind(task.status.as_str())
        .bind(&task.stdout)
        .bind(&task.stderr)
        .bind(format_datetime(&task.start_time))
        .bind(task.finish_time.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn list(&self, run_id: &Uuid) -> Result<Vec<Task>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT run_id, name, status, stdout, stderr, start_time, finish_time FROM tasks \
             WHERE run_id = ? ORDER BY start_time ASC, name ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(task_from_row).collect()
    }

    async fn delete_by_run(&self, run_id: &Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM tasks WHERE run_id = ?")
            .bind(run_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected())
    }
}
