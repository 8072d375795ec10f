use std::sync::Arc;

use bioflow_types::event::{CancelRunEvent, DeleteRunEvent, Event};
use tracing::{debug, info};

use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::run::RunRepository;
use crate::repository::task::TaskRepository;

const RECHECK_DELAY_SECS: u64 = 10;

/// Removes a run and its tasks once the run has stopped.
pub struct DeleteRunHandler<R, T> {
    runs: Arc<R>,
    tasks: Arc<T>,
    publisher: Arc<dyn EventPublisher>,
}

impl<R: RunRepository, T: TaskRepository> DeleteRunHandler<R, T> {
    pub fn new(runs: Arc<R>, tasks: Arc<T>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            runs,
            tasks,
            publisher,
        }
    }

    async fn delete(&self, event: &DeleteRunEvent) -> Result<(), HandlerError> {
        let Some(run) = self.runs.get(&event.run_id).await? else {
            debug!(run_id = %event.run_id, "run already deleted");
            return Ok(());
        };

        if !run.status.is_finished() {
            self.publisher
                .publish(Event::CancelRun(CancelRunEvent {
                    submission_id: run.submission_id,
                    run_id: run.id,
                }))
                .await?;
            self.publisher
                .publish(Event::DeleteRun(DeleteRunEvent {
                    submission_id: run.submission_id,
                    run_id: run.id,
                    delay_secs: RECHECK_DELAY_SECS,
                }))
                .await?;
            debug!(run_id = %run.id, status = %run.status, "run still active, delete postponed");
            return Ok(());
        }

        let tasks = self.tasks.delete_by_run(&run.id).await?;
        self.runs.delete(&run.id).await?;
        info!(run_id = %run.id, submission_id = %run.submission_id, tasks, "run deleted");
        Ok(())
    }
}

impl<R: RunRepository, T: TaskRepository> EventHandler for DeleteRunHandler<R, T> {
    fn name(&self) -> &'static str {
        "delete_run"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::DeleteRun(e) => self.delete(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
