use std::sync::Arc;

use bioflow_types::error::EngineError;
use bioflow_types::event::{CancelRunEvent, Event, SyncRunEvent, SyncSubmissionEvent};
use bioflow_types::run::RunStatus;
use chrono::Utc;
use tracing::{debug, info};

use crate::engine::EngineClient;
use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::run::RunRepository;

/// Asks the engine to stop a run and follows up with a sync.
pub struct CancelRunHandler<R, C> {
    runs: Arc<R>,
    engine: Arc<C>,
    publisher: Arc<dyn EventPublisher>,
}

impl<R: RunRepository, C: EngineClient> CancelRunHandler<R, C> {
    pub fn new(runs: Arc<R>, engine: Arc<C>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            runs,
            engine,
            publisher,
        }
    }

    async fn cancel(&self, event: &CancelRunEvent) -> Result<(), HandlerError> {
        let Some(mut run) = self.runs.get(&event.run_id).await? else {
            debug!(run_id = %event.run_id, "run gone, nothing to cancel");
            return Ok(());
        };
        if run.status.is_finished() {
            return Ok(());
        }

        let Some(engine_run_id) = run.engine_run_id.clone() else {
            // Never reached the engine; nothing to stop.
            run.status = RunStatus::Cancelled;
            run.finish_time = Some(Utc::now());
            self.runs.save(&run).await?;
            info!(run_id = %run.id, "unsubmitted run cancelled");
            self.publisher
                .publish(Event::SyncSubmission(SyncSubmissionEvent {
                    submission_id: run.submission_id,
                }))
                .await?;
            return Ok(());
        };

        match self.engine.cancel_run(&engine_run_id).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => {
                debug!(run_id = %run.id, %engine_run_id, "engine run already gone");
            }
            Err(err) => return Err(err.into()),
        }

        if run.status != RunStatus::Cancelling {
            run.status = RunStatus::Cancelling;
            self.runs.save(&run).await?;
            info!(run_id = %run.id, %engine_run_id, "run cancelling");
        }
        // Every delivery restarts polling; syncing a finished run is a no-op.
        self.publisher
            .publish(Event::SyncRun(SyncRunEvent {
                submission_id: run.submission_id,
                run_id: run.id,
                delay_secs: 0,
            }))
            .await?;
        Ok(())
    }
}

impl<R: RunRepository, C: EngineClient> EventHandler for CancelRunHandler<R, C> {
    fn name(&self) -> &'static str {
        "cancel_run"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::CancelRun(e) => self.cancel(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
