use std::sync::Arc;
use std::time::Duration;

use bioflow_types::event::{CancelRunEvent, CancelSubmissionEvent, Event, SyncSubmissionEvent};
use bioflow_types::submission::{Submission, SubmissionStatus};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::run::{RunFilter, RunRepository};
use crate::repository::submission::SubmissionRepository;

/// How long a cancel request waits for runs that are still being created.
pub const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Delay between checks while waiting for run creation.
const RECHECK_DELAY_SECS: u64 = 10;

/// Fans a cancel request out to every run of the submission.
pub struct CancelSubmissionHandler<S, R> {
    submissions: Arc<S>,
    runs: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: SubmissionRepository, R: RunRepository> CancelSubmissionHandler<S, R> {
    pub fn new(submissions: Arc<S>, runs: Arc<R>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            submissions,
            runs,
            publisher,
        }
    }

    async fn cancel(&self, event: &CancelSubmissionEvent) -> Result<(), HandlerError> {
        let Some(mut submission) = self.submissions.get(&event.submission_id).await? else {
            debug!(submission_id = %event.submission_id, "submission gone, nothing to cancel");
            return Ok(());
        };
        if submission.status.is_finished() {
            debug!(submission_id = %submission.id, status = %submission.status, "submission already finished");
            return Ok(());
        }

        let runs = self.runs.list(&RunFilter::submission(submission.id)).await?;
        for run in runs.iter().filter(|r| !r.status.is_finished()) {
            self.publisher
                .publish(Event::CancelRun(CancelRunEvent {
                    submission_id: submission.id,
                    run_id: run.id,
                }))
                .await?;
        }

        let expected = submission.expected_run_count();
        if expected == 0 && runs.is_empty() {
            return self.finish_cancelled(&mut submission).await;
        }

        if runs.len() < expected {
            let waited = (Utc::now() - event.requested_at).to_std().unwrap_or(Duration::ZERO);
            if waited < CANCEL_GRACE_PERIOD {
                self.mark_cancelling(&mut submission).await?;
                self.publisher
                    .publish(Event::CancelSubmission(CancelSubmissionEvent {
                        submission_id: submission.id,
                        requested_at: event.requested_at,
                        delay_secs: RECHECK_DELAY_SECS,
                    }))
                    .await?;
                debug!(
                    submission_id = %submission.id,
                    created = runs.len(),
                    expected,
                    "waiting for remaining runs before cancelling"
                );
                return Ok(());
            }
            warn!(
                submission_id = %submission.id,
                created = runs.len(),
                expected,
                "runs never appeared within the grace period, forcing cancellation"
            );
            return self.finish_cancelled(&mut submission).await;
        }

        self.mark_cancelling(&mut submission).await?;
        // Runs that already finished will not report back on their own.
        self.publisher
            .publish(Event::SyncSubmission(SyncSubmissionEvent {
                submission_id: submission.id,
            }))
            .await?;
        Ok(())
    }

    async fn mark_cancelling(&self, submission: &mut Submission) -> Result<(), HandlerError> {
        if submission.status != SubmissionStatus::Cancelling {
            submission.status = SubmissionStatus::Cancelling;
            self.submissions.save(submission).await?;
            info!(submission_id = %submission.id, "submission cancelling");
        }
        Ok(())
    }

    async fn finish_cancelled(&self, submission: &mut Submission) -> Result<(), HandlerError> {
        submission.status = SubmissionStatus::Cancelled;
        submission.finish_time = Some(Utc::now());
        self.submissions.save(submission).await?;
        info!(submission_id = %submission.id, "submission cancelled");
        Ok(())
    }
}

impl<S: SubmissionRepository, R: RunRepository> EventHandler for CancelSubmissionHandler<S, R> {
    fn name(&self) -> &'static str {
        "cancel_submission"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::CancelSubmission(e) => self.cancel(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
