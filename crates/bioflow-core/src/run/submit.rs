use std::collections::BTreeMap;
use std::sync::Arc;

use bioflow_types::engine::RunWorkflowRequest;
use bioflow_types::error::EngineError;
use bioflow_types::event::{Event, SubmitRunEvent, SyncRunEvent, SyncSubmissionEvent};
use bioflow_types::run::{Run, RunStatus};
use bioflow_types::workflow::RunConfig;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::EngineClient;
use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::run::RunRepository;

/// Hands a pending run to the engine.
pub struct SubmitRunHandler<R, C> {
    runs: Arc<R>,
    engine: Arc<C>,
    publisher: Arc<dyn EventPublisher>,
}

fn build_request(run: &Run, config: &RunConfig) -> RunWorkflowRequest {
    let tags = BTreeMap::from([
        ("submission_id".to_string(), run.submission_id.to_string()),
        ("run_id".to_string(), run.id.to_string()),
        ("run_name".to_string(), run.name.clone()),
    ]);
    RunWorkflowRequest {
        workflow_type: config.language.clone(),
        workflow_type_version: config.version.clone(),
        workflow_url: config.main_workflow_path.clone(),
        attachments: config.files.clone(),
        workflow_params: run.inputs.clone(),
        workflow_engine_parameters: config.engine_params.clone(),
        tags,
    }
}

impl<R: RunRepository, C: EngineClient> SubmitRunHandler<R, C> {
    pub fn new(runs: Arc<R>, engine: Arc<C>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            runs,
            engine,
            publisher,
        }
    }

    async fn submit(&self, event: &SubmitRunEvent) -> Result<(), HandlerError> {
        let Some(mut run) = self.runs.get(&event.run_id).await? else {
            debug!(run_id = %event.run_id, "run gone, nothing to submit");
            return Ok(());
        };
        if run.status == RunStatus::Cancelling || run.status.is_finished() {
            debug!(run_id = %run.id, status = %run.status, "run no longer submittable");
            return Ok(());
        }
        if run.engine_run_id.is_some() {
            debug!(run_id = %run.id, "run already submitted, resuming sync");
            return self.publish_sync(&run).await;
        }

        let request = build_request(&run, &event.run_config);
        match self.engine.run_workflow(&request).await {
            Ok(engine_run_id) => {
                info!(run_id = %run.id, submission_id = %run.submission_id, %engine_run_id, "run submitted");
                run.engine_run_id = Some(engine_run_id);
                self.runs.save(&run).await?;
                self.publish_sync(&run).await
            }
            Err(EngineError::BadRequest(message)) => {
                warn!(run_id = %run.id, %message, "engine rejected run");
                run.status = RunStatus::Failed;
                run.message = Some(message);
                run.finish_time = Some(Utc::now());
                self.runs.save(&run).await?;
                self.publisher
                    .publish(Event::SyncSubmission(SyncSubmissionEvent {
                        submission_id: run.submission_id,
                    }))
                    .await?;
                Ok(())
            }
            Err(err) => {
                warn!(run_id = %run.id, error = %err, "run submission failed");
                Err(err.into())
            }
        }
    }

    async fn publish_sync(&self, run: &Run) -> Result<(), HandlerError> {
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

impl<R: RunRepository, C: EngineClient> EventHandler for SubmitRunHandler<R, C> {
    fn name(&self) -> &'static str {
        "submit_run"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::SubmitRun(e) => self.submit(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
