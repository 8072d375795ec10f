use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use bioflow_types::engine::RunLog;
use bioflow_types::error::EngineError;
use bioflow_types::event::{Event, SyncRunEvent, SyncSubmissionEvent};
use bioflow_types::run::{Run, RunStatus, Task, TaskStatus};
use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use super::status::{next_run_status, task_status};
use crate::engine::EngineClient;
use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::run::RunRepository;
use crate::repository::task::TaskRepository;

/// Delay range between polls of a live run.
pub const POLL_JITTER_MS: RangeInclusive<u64> = 5_000..=10_000;

fn poll_delay() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(POLL_JITTER_MS))
}

/// Polls the engine for one run and mirrors its state and tasks.
pub struct SyncRunHandler<R, T, C> {
    runs: Arc<R>,
    tasks: Arc<T>,
    engine: Arc<C>,
    publisher: Arc<dyn EventPublisher>,
}

impl<R, T, C> SyncRunHandler<R, T, C>
where
    R: RunRepository,
    T: TaskRepository,
    C: EngineClient,
{
    pub fn new(runs: Arc<R>, tasks: Arc<T>, engine: Arc<C>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            runs,
            tasks,
            engine,
            publisher,
        }
    }

    async fn sync(&self, event: &SyncRunEvent) -> Result<(), HandlerError> {
        let Some(mut run) = self.runs.get(&event.run_id).await? else {
            debug!(run_id = %event.run_id, "run gone, stop polling");
            return Ok(());
        };
        if run.status.is_finished() {
            return Ok(());
        }
        let Some(engine_run_id) = run.engine_run_id.clone() else {
            return self.fail(&mut run, "run was never submitted to the engine").await;
        };

        let log = match self.engine.get_run_log(&engine_run_id).await {
            Ok(log) => log,
            Err(EngineError::NotFound(message)) => {
                warn!(run_id = %run.id, %engine_run_id, "engine no longer knows the run");
                return self.fail(&mut run, &message).await;
            }
            Err(err) => return Err(err.into()),
        };

        let next = next_run_status(run.status, log.state);
        let tasks_changed = self.sync_tasks(&run, next, &log).await?;
        let run_changed = next != run.status;
        if run_changed {
            info!(run_id = %run.id, from = %run.status, to = %next, state = ?log.state, "run status changed");
            run.status = next;
            run.log = log.log.clone();
            run.message = log.message.clone();
            if next.is_finished() {
                run.finish_time = Some(Utc::now());
                if !log.outputs.is_null() {
                    run.outputs = Some(log.outputs.clone());
                }
            }
            self.runs.save(&run).await?;
        }
        if run_changed || tasks_changed {
            self.publish_submission_sync(&run).await?;
        }

        if next.is_finished() {
            Ok(())
        } else {
            Err(HandlerError::Delayed(poll_delay()))
        }
    }

    /// Upsert tasks whose status or output changed. Returns whether any did.
    async fn sync_tasks(&self, run: &Run, run_status: RunStatus, log: &RunLog) -> Result<bool, HandlerError> {
        if log.task_logs.is_empty() {
            return Ok(false);
        }
        let existing: HashMap<String, Task> = self
            .tasks
            .list(&run.id)
            .await?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();

        let now = Utc::now();
        let mut changed = false;
        for entry in &log.task_logs {
            let status = task_status(entry.exit_code, run_status);
            let finished = !matches!(status, TaskStatus::Pending | TaskStatus::Running);
            let task = match existing.get(&entry.name) {
                Some(task) if task.status == status && task.stdout == entry.stdout && task.stderr == entry.stderr => {
                    continue;
                }
                Some(task) => Task {
                    status,
                    stdout: entry.stdout.clone(),
                    stderr: entry.stderr.clone(),
                    finish_time: task.finish_time.or(finished.then_some(now)),
                    ..task.clone()
                },
                None => Task {
                    name: entry.name.clone(),
                    run_id: run.id,
                    status,
                    stdout: entry.stdout.clone(),
                    stderr: entry.stderr.clone(),
                    start_time: now,
                    finish_time: finished.then_some(now),
                },
            };
            self.tasks.save(&task).await?;
            changed = true;
        }
        Ok(changed)
    }

    async fn fail(&self, run: &mut Run, message: &str) -> Result<(), HandlerError> {
        run.status = RunStatus::Failed;
        run.message = Some(message.to_string());
        run.finish_time = Some(Utc::now());
        self.runs.save(run).await?;
        warn!(run_id = %run.id, message, "run failed");
        self.publish_submission_sync(run).await
    }

    async fn publish_submission_sync(&self, run: &Run) -> Result<(), HandlerError> {
        self.publisher
            .publish(Event::SyncSubmission(SyncSubmissionEvent {
                submission_id: run.submission_id,
            }))
            .await?;
        Ok(())
    }
}

impl<R, T, C> EventHandler for SyncRunHandler<R, T, C>
where
    R: RunRepository,
    T: TaskRepository,
    C: EngineClient,
{
    fn name(&self) -> &'static str {
        "sync_run"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::SyncRun(e) => self.sync(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
