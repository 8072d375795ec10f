use std::collections::BTreeMap;
use std::sync::Arc;

use bioflow_types::event::{Event, SyncSubmissionEvent};
use bioflow_types::run::{Run, RunStatus};
use bioflow_types::submission::{Submission, SubmissionStatus, SubmissionType};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::data_model::DataModelService;
use crate::event::handler::{BoxFuture, EventHandler, HandlerError, unexpected_event};
use crate::repository::run::{RunFilter, RunRepository};
use crate::repository::submission::SubmissionRepository;
use crate::resolver::Reference;

/// Derive a submission status from its run counts.
///
/// Priority is pending > running > cancelling > cancelled > finished. Runs
/// that are expected but not created yet count as pending. Returns `None`
/// when there are no runs at all.
pub fn aggregate_status(counts: &BTreeMap<RunStatus, u64>, expected: usize) -> Option<SubmissionStatus> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return None;
    }
    let has = |status: RunStatus| counts.get(&status).copied().unwrap_or(0) > 0;

    let status = if has(RunStatus::Pending) || (total as usize) < expected {
        SubmissionStatus::Pending
    } else if has(RunStatus::Running) {
        SubmissionStatus::Running
    } else if has(RunStatus::Cancelling) {
        SubmissionStatus::Cancelling
    } else if has(RunStatus::Cancelled) {
        SubmissionStatus::Cancelled
    } else {
        SubmissionStatus::Finished
    };
    Some(status)
}

/// Folds run statuses into the submission and writes outputs back on finish.
pub struct SyncSubmissionHandler<S, R, D> {
    submissions: Arc<S>,
    runs: Arc<R>,
    data_model: Arc<D>,
}

impl<S, R, D> SyncSubmissionHandler<S, R, D>
where
    S: SubmissionRepository,
    R: RunRepository,
    D: DataModelService,
{
    pub fn new(submissions: Arc<S>, runs: Arc<R>, data_model: Arc<D>) -> Self {
        Self {
            submissions,
            runs,
            data_model,
        }
    }

    async fn sync(&self, event: &SyncSubmissionEvent) -> Result<(), HandlerError> {
        let Some(mut submission) = self.submissions.get(&event.submission_id).await? else {
            debug!(submission_id = %event.submission_id, "submission gone, nothing to sync");
            return Ok(());
        };
        if submission.status.is_finished() {
            return Ok(());
        }

        let counts = self.runs.count_by_status(&submission.id).await?;
        let Some(derived) = aggregate_status(&counts, submission.expected_run_count()) else {
            return Ok(());
        };
        let next = match (submission.status, derived) {
            (SubmissionStatus::Cancelling, SubmissionStatus::Pending | SubmissionStatus::Running) => {
                SubmissionStatus::Cancelling
            }
            _ => derived,
        };
        if next == submission.status {
            return Ok(());
        }

        if next == SubmissionStatus::Finished && submission.submission_type == SubmissionType::DataModel {
            self.write_back(&submission).await?;
        }

        let previous = submission.status;
        submission.status = next;
        if next.is_finished() {
            submission.finish_time = Some(Utc::now());
        }
        self.submissions.save(&submission).await?;
        info!(submission_id = %submission.id, from = %previous, to = %next, "submission status changed");
        Ok(())
    }

    /// Patch succeeded run outputs into the selected table, one row per run.
    async fn write_back(&self, submission: &Submission) -> Result<(), HandlerError> {
        let columns: Vec<(&str, &str)> = submission
            .outputs
            .iter()
            .filter_map(|(key, value)| {
                let header = Reference::output_header(value.as_str()?)?;
                Some((key.as_str(), header))
            })
            .collect();
        if columns.is_empty() {
            return Ok(());
        }
        let Some(data_model_id) = submission.data_model_id.as_deref() else {
            return Ok(());
        };
        let Some(table) = self
            .data_model
            .get_table(&submission.workspace_id, data_model_id)
            .await?
        else {
            warn!(submission_id = %submission.id, data_model_id, "output table is gone, skipping write-back");
            return Ok(());
        };

        let runs = self
            .runs
            .list(&RunFilter::submission(submission.id).with_statuses(&[RunStatus::Succeeded]))
            .await?;
        if runs.is_empty() {
            return Ok(());
        }

        let id_header = table
            .headers
            .first()
            .cloned()
            .unwrap_or_else(|| table.id_header());
        let headers: Vec<String> = std::iter::once(id_header)
            .chain(columns.iter().map(|(_, header)| header.to_string()))
            .collect();
        let rows: Vec<Vec<String>> = runs.iter().map(|run| output_row(run, &columns)).collect();

        self.data_model
            .patch_table(&submission.workspace_id, &table.name, &headers, &rows)
            .await?;
        info!(
            submission_id = %submission.id,
            table = %table.name,
            rows = rows.len(),
            columns = columns.len(),
            "outputs written back"
        );
        Ok(())
    }
}

fn output_row(run: &Run, columns: &[(&str, &str)]) -> Vec<String> {
    let mut row = Vec::with_capacity(columns.len() + 1);
    row.push(run.name.clone());
    for (key, _) in columns {
        let cell = match run.outputs.as_ref().and_then(|o| o.get(*key)) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        row.push(cell);
    }
    row
}

impl<S, R, D> EventHandler for SyncSubmissionHandler<S, R, D>
where
    S: SubmissionRepository,
    R: RunRepository,
    D: DataModelService,
{
    fn name(&self) -> &'static str {
        "sync_submission"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::SyncSubmission(e) => self.sync(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}
