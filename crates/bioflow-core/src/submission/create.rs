use std::sync::Arc;

use bioflow_types::error::AppError;
use bioflow_types::event::{CreateRunsEvent, CreateSubmissionEvent, Event};
use bioflow_types::workflow::RunConfig;
use tracing::{debug, info};

use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::submission::SubmissionRepository;
use crate::repository::workflow::WorkflowRepository;

/// Turns a new submission into a `CreateRuns` event carrying the run config.
pub struct CreateSubmissionHandler<S, W> {
    submissions: Arc<S>,
    workflows: Arc<W>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: SubmissionRepository, W: WorkflowRepository> CreateSubmissionHandler<S, W> {
    pub fn new(submissions: Arc<S>, workflows: Arc<W>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            submissions,
            workflows,
            publisher,
        }
    }

    async fn create(&self, event: &CreateSubmissionEvent) -> Result<(), HandlerError> {
        let Some(submission) = self.submissions.get(&event.submission_id).await? else {
            debug!(submission_id = %event.submission_id, "submission gone, nothing to create");
            return Ok(());
        };
        if submission.status.is_finished() {
            debug!(submission_id = %submission.id, status = %submission.status, "submission already finished");
            return Ok(());
        }

        let workflow = self
            .workflows
            .get_workflow(&submission.workflow_id)
            .await?
            .ok_or_else(|| AppError::Invalid(format!("workflow '{}' not found", submission.workflow_id)))?;

        let version_id = if submission.workflow_version_id.is_empty() {
            workflow
                .latest_version_id
                .clone()
                .ok_or_else(|| AppError::Invalid(format!("workflow '{}' has no versions", workflow.id)))?
        } else {
            submission.workflow_version_id.clone()
        };
        let version = self
            .workflows
            .get_version(&version_id)
            .await?
            .filter(|v| v.workflow_id == workflow.id)
            .ok_or_else(|| AppError::Invalid(format!("workflow version '{version_id}' not found")))?;
        let files = self.workflows.list_files(&version.id).await?;

        let run_config = RunConfig::new(&version, files, &submission.exposed_options);
        self.publisher
            .publish(Event::CreateRuns(CreateRunsEvent {
                submission_id: submission.id,
                workspace_id: submission.workspace_id.clone(),
                submission_type: submission.submission_type,
                data_model_id: submission.data_model_id.clone(),
                data_model_row_ids: submission.data_model_row_ids.clone(),
                inputs: submission.inputs.clone(),
                outputs: submission.outputs.clone(),
                run_config,
            }))
            .await?;

        info!(
            submission_id = %submission.id,
            workflow_id = %workflow.id,
            version_id = %version.id,
            runs = submission.expected_run_count(),
            "submission accepted, creating runs"
        );
        Ok(())
    }
}

impl<S: SubmissionRepository, W: WorkflowRepository> EventHandler for CreateSubmissionHandler<S, W> {
    fn name(&self) -> &'static str {
        "create_submission"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::CreateSubmission(e) => self.create(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_types::event::EventKind;
    use uuid::Uuid;

    use crate::test_support::{Harness, sample_submission};

    fn handler(h: &Harness) -> CreateSubmissionHandler<
        crate::memory::MemorySubmissionRepository,
        crate::memory::MemoryWorkflowRepository,
    > {
        CreateSubmissionHandler::new(h.submissions.clone(), h.workflows.clone(), h.recorder.clone())
    }

    #[tokio::test]
    async fn publishes_create_runs_with_run_config() {
        let h = Harness::new().await;
        let submission = sample_submission(&h, &["s1", "s2"]).await;

        handler(&h)
            .create(&CreateSubmissionEvent {
                submission_id: submission.id,
            })
            .await
            .unwrap();

        let events = h.recorder.take();
        assert_eq!(events.len(), 1);
        let Event::CreateRuns(create) = &events[0] else {
            panic!("expected CreateRuns, got {:?}", events[0]);
        };
        assert_eq!(create.data_model_row_ids, vec!["s1", "s2"]);
        assert_eq!(create.run_config.main_workflow_path, "main.wdl");
        assert_eq!(create.run_config.files.len(), 1);
        assert_eq!(create.run_config.engine_params["read_from_cache"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn missing_submission_is_noop() {
        let h = Harness::new().await;
        handler(&h)
            .create(&CreateSubmissionEvent {
                submission_id: Uuid::now_v7(),
            })
            .await
            .unwrap();
        assert!(h.recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn unknown_workflow_is_invalid() {
        let h = Harness::new().await;
        let mut submission = sample_submission(&h, &["s1"]).await;
        submission.workflow_id = "missing".into();
        h.submissions.save(&submission).await.unwrap();

        let err = handler(&h)
            .create(&CreateSubmissionEvent {
                submission_id: submission.id,
            })
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(!h.recorder.kinds().contains(&EventKind::CreateRuns));
    }
}
