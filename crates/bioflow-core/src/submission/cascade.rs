use std::sync::Arc;

use bioflow_types::event::{DeleteSubmissionEvent, Event};
use chrono::Utc;
use tracing::info;

use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::submission::{SubmissionFilter, SubmissionRepository};

/// Deletes every submission of a deleted workflow or workspace.
pub struct CascadeDeleteHandler<S> {
    submissions: Arc<S>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: SubmissionRepository> CascadeDeleteHandler<S> {
    pub fn new(submissions: Arc<S>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            submissions,
            publisher,
        }
    }

    async fn cascade(&self, workspace_id: &str, workflow_id: Option<&str>) -> Result<(), HandlerError> {
        let filter = SubmissionFilter {
            workspace_id: Some(workspace_id.to_string()),
            workflow_id: workflow_id.map(str::to_string),
            include_deleted: true,
            ..Default::default()
        };
        let submissions = self.submissions.list(&filter).await?;
        let now = Utc::now();
        for submission in &submissions {
            self.submissions.soft_delete(&submission.id, now).await?;
            self.publisher
                .publish(Event::DeleteSubmission(DeleteSubmissionEvent {
                    submission_id: submission.id,
                    delay_secs: 0,
                }))
                .await?;
        }
        info!(
            workspace_id,
            workflow_id = workflow_id.unwrap_or("*"),
            count = submissions.len(),
            "cascading submission delete"
        );
        Ok(())
    }
}

impl<S: SubmissionRepository> EventHandler for CascadeDeleteHandler<S> {
    fn name(&self) -> &'static str {
        "cascade_delete"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::WorkflowDeleted(e) => self.cascade(&e.workspace_id, Some(&e.workflow_id)).await,
                Event::WorkspaceDeleted(e) => self.cascade(&e.workspace_id, None).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
