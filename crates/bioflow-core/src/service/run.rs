//! Run and task queries, plus single-run cancellation.

use std::sync::Arc;

use bioflow_types::error::AppError;
use bioflow_types::event::{CancelRunEvent, Event};
use bioflow_types::run::{Run, RunStatus, Task};
use bioflow_types::submission::Submission;
use tracing::info;
use uuid::Uuid;

use crate::event::EventPublisher;
use crate::repository::run::{RunFilter, RunRepository};
use crate::repository::submission::SubmissionRepository;
use crate::repository::task::TaskRepository;

#[derive(Debug, Clone, Default)]
pub struct ListRunsQuery {
    pub workspace_id: String,
    pub submission_id: Uuid,
    pub statuses: Vec<RunStatus>,
    pub search_word: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListTasksQuery {
    pub workspace_id: String,
    pub submission_id: Uuid,
    pub run_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct CancelRunCommand {
    pub workspace_id: String,
    pub submission_id: Uuid,
    pub run_id: Uuid,
}

pub struct RunService<S, R, T> {
    submissions: Arc<S>,
    runs: Arc<R>,
    tasks: Arc<T>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S, R, T> RunService<S, R, T>
where
    S: SubmissionRepository,
    R: RunRepository,
    T: TaskRepository,
{
    pub fn new(submissions: Arc<S>, runs: Arc<R>, tasks: Arc<T>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            submissions,
            runs,
            tasks,
            publisher,
        }
    }

    /// Runs of one submission, ordered by name.
    pub async fn list_runs(&self, query: ListRunsQuery) -> Result<Vec<Run>, AppError> {
        self.submission(&query.workspace_id, &query.submission_id).await?;
        let filter = RunFilter {
            submission_id: Some(query.submission_id),
            statuses: query.statuses,
            search_word: query.search_word,
        };
        Ok(self.runs.list(&filter).await?)
    }

    pub async fn get_run(&self, workspace_id: &str, submission_id: &Uuid, run_id: &Uuid) -> Result<Run, AppError> {
        self.submission(workspace_id, submission_id).await?;
        self.run(submission_id, run_id).await
    }

    pub async fn list_tasks(&self, query: ListTasksQuery) -> Result<Vec<Task>, AppError> {
        self.submission(&query.workspace_id, &query.submission_id).await?;
        let run = self.run(&query.submission_id, &query.run_id).await?;
        Ok(self.tasks.list(&run.id).await?)
    }

    pub async fn cancel_run(&self, command: CancelRunCommand) -> Result<(), AppError> {
        self.submission(&command.workspace_id, &command.submission_id).await?;
        let run = self.run(&command.submission_id, &command.run_id).await?;
        if run.status.is_finished() {
            return Err(AppError::Invalid(format!(
                "run '{}' is {} and cannot be cancelled",
                run.id, run.status
            )));
        }
        self.publisher
            .publish(Event::CancelRun(CancelRunEvent {
                submission_id: run.submission_id,
                run_id: run.id,
            }))
            .await?;
        info!(run_id = %run.id, submission_id = %run.submission_id, "run cancel requested");
        Ok(())
    }

    async fn submission(&self, workspace_id: &str, id: &Uuid) -> Result<Submission, AppError> {
        self.submissions
            .get(id)
            .await?
            .filter(|s| s.workspace_id == workspace_id && s.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("submission '{id}'")))
    }

    async fn run(&self, submission_id: &Uuid, run_id: &Uuid) -> Result<Run, AppError> {
        self.runs
            .get(run_id)
            .await?
            .filter(|r| &r.submission_id == submission_id)
            .ok_or_else(|| AppError::NotFound(format!("run '{run_id}'")))
    }
}
