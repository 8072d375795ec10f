use std::sync::Arc;

use bioflow_types::event::{CancelSubmissionEvent, DeleteRunEvent, DeleteSubmissionEvent, Event};
use bioflow_types::submission::SubmissionStatus;
use chrono::Utc;
use tracing::{debug, info};

use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::run::{RunFilter, RunRepository};
use crate::repository::submission::SubmissionRepository;

/// Recheck delay after requesting cancellation.
const AFTER_CANCEL_DELAY_SECS: u64 = 10;

/// Recheck delay while runs are still cancelling.
const WHILE_CANCELLING_DELAY_SECS: u64 = 30;

/// Cancels, waits for, and then removes a submission and its runs.
pub struct DeleteSubmissionHandler<S, R> {
    submissions: Arc<S>,
    runs: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: SubmissionRepository, R: RunRepository> DeleteSubmissionHandler<S, R> {
    pub fn new(submissions: Arc<S>, runs: Arc<R>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            submissions,
            runs,
            publisher,
        }
    }

    fn retry_later(&self, event: &DeleteSubmissionEvent, delay_secs: u64) -> Event {
        Event::DeleteSubmission(DeleteSubmissionEvent {
            submission_id: event.submission_id,
            delay_secs,
        })
    }

    async fn delete(&self, event: &DeleteSubmissionEvent) -> Result<(), HandlerError> {
        let Some(mut submission) = self.submissions.get(&event.submission_id).await? else {
            debug!(submission_id = %event.submission_id, "submission already deleted");
            return Ok(());
        };

        if submission.status.is_cancellable() {
            self.publisher
                .publish(Event::CancelSubmission(CancelSubmissionEvent {
                    submission_id: submission.id,
                    requested_at: Utc::now(),
                    delay_secs: 0,
                }))
                .await?;
            submission.status = SubmissionStatus::Cancelling;
            self.submissions.save(&submission).await?;
            self.publisher
                .publish(self.retry_later(event, AFTER_CANCEL_DELAY_SECS))
                .await?;
            info!(submission_id = %submission.id, "cancelling submission before delete");
            return Ok(());
        }

        if submission.status == SubmissionStatus::Cancelling {
            self.publisher
                .publish(self.retry_later(event, WHILE_CANCELLING_DELAY_SECS))
                .await?;
            debug!(submission_id = %submission.id, "submission still cancelling, delete postponed");
            return Ok(());
        }

        let runs = self.runs.list(&RunFilter::submission(submission.id)).await?;
        for run in &runs {
            self.publisher
                .publish(Event::DeleteRun(DeleteRunEvent {
                    submission_id: submission.id,
                    run_id: run.id,
                    delay_secs: 0,
                }))
                .await?;
        }
        self.submissions.delete(&submission.id).await?;
        info!(submission_id = %submission.id, runs = runs.len(), "submission deleted");
        Ok(())
    }
}

impl<S: SubmissionRepository, R: RunRepository> EventHandler for DeleteSubmissionHandler<S, R> {
    fn name(&self) -> &'static str {
        "delete_submission"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::DeleteSubmission(e) => self.delete(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
