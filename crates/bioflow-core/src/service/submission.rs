//! Submission commands and queries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bioflow_types::error::AppError;
use bioflow_types::event::{CancelSubmissionEvent, CreateSubmissionEvent, DeleteSubmissionEvent, Event};
use bioflow_types::run::RunStatus;
use bioflow_types::submission::{
    ExposedOptions, Submission, SubmissionStatus, SubmissionType, Template,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::event::EventPublisher;
use crate::repository::run::RunRepository;
use crate::repository::submission::{SubmissionFilter, SubmissionRepository};
use crate::repository::workflow::WorkflowRepository;

/// Request to start a new submission.
///
/// This is also the on-disk shape `bioflow submission create` reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubmissionCommand {
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub workflow_id: String,
    /// Defaults to the workflow's latest version.
    #[serde(default)]
    pub workflow_version_id: Option<String>,
    pub submission_type: SubmissionType,
    #[serde(default)]
    pub data_model_id: Option<String>,
    #[serde(default)]
    pub data_model_row_ids: Vec<String>,
    pub inputs: Template,
    #[serde(default)]
    pub outputs: Template,
    #[serde(default)]
    pub exposed_options: ExposedOptions,
}

#[derive(Debug, Clone)]
pub struct CancelSubmissionCommand {
    pub workspace_id: String,
    pub submission_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct DeleteSubmissionCommand {
    pub workspace_id: String,
    pub submission_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct ListSubmissionsQuery {
    pub workspace_id: String,
    pub workflow_id: Option<String>,
    pub statuses: Vec<SubmissionStatus>,
    pub search_word: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// A submission together with how many of its runs are in each status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionSummary {
    #[serde(flatten)]
    pub submission: Submission,
    pub run_counts: BTreeMap<RunStatus, u64>,
}

/// Entry point for everything a caller can do with submissions.
pub struct SubmissionService<S, R, W> {
    submissions: Arc<S>,
    runs: Arc<R>,
    workflows: Arc<W>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S, R, W> SubmissionService<S, R, W>
where
    S: SubmissionRepository,
    R: RunRepository,
    W: WorkflowRepository,
{
    pub fn new(submissions: Arc<S>, runs: Arc<R>, workflows: Arc<W>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            submissions,
            runs,
            workflows,
            publisher,
        }
    }

    /// Validate and persist a new submission, then hand it to the saga.
    ///
    /// The workflow version is pinned at creation time so later releases of
    /// the workflow do not change what an accepted submission runs.
    pub async fn create_submission(&self, command: CreateSubmissionCommand) -> Result<Uuid, AppError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Invalid("submission name cannot be empty".to_string()));
        }
        validate_targets(&command)?;

        let workflow = self
            .workflows
            .get_workflow(&command.workflow_id)
            .await?
            .filter(|w| w.workspace_id == command.workspace_id)
            .ok_or_else(|| AppError::NotFound(format!("workflow '{}'", command.workflow_id)))?;
        let version_id = match command.workflow_version_id.as_deref().filter(|v| !v.is_empty()) {
            Some(id) => id.to_string(),
            None => workflow
                .latest_version_id
                .clone()
                .ok_or_else(|| AppError::Invalid(format!("workflow '{}' has no versions", workflow.id)))?,
        };
        self.workflows
            .get_version(&version_id)
            .await?
            .filter(|v| v.workflow_id == workflow.id)
            .ok_or_else(|| AppError::NotFound(format!("workflow version '{version_id}'")))?;

        let existing = self
            .submissions
            .list(&SubmissionFilter {
                name: Some(name.clone()),
                limit: Some(1),
                ..SubmissionFilter::workspace(&command.workspace_id)
            })
            .await?;
        if !existing.is_empty() {
            return Err(AppError::AlreadyExists(format!("submission named '{name}'")));
        }

        let submission = Submission {
            id: Uuid::now_v7(),
            name,
            description: command.description,
            workflow_id: workflow.id,
            workflow_version_id: version_id,
            workspace_id: command.workspace_id,
            data_model_id: command.data_model_id,
            data_model_row_ids: command.data_model_row_ids,
            submission_type: command.submission_type,
            inputs: command.inputs,
            outputs: command.outputs,
            exposed_options: command.exposed_options,
            status: SubmissionStatus::Pending,
            start_time: Utc::now(),
            finish_time: None,
            deleted_at: None,
        };
        self.submissions.save(&submission).await?;
        self.publisher
            .publish(Event::CreateSubmission(CreateSubmissionEvent {
                submission_id: submission.id,
            }))
            .await?;

        info!(
            submission_id = %submission.id,
            workspace_id = %submission.workspace_id,
            runs = submission.expected_run_count(),
            "submission created"
        );
        Ok(submission.id)
    }

    pub async fn cancel_submission(&self, command: CancelSubmissionCommand) -> Result<(), AppError> {
        let submission = self.visible(&command.workspace_id, &command.submission_id).await?;
        if !submission.status.is_cancellable() {
            return Err(AppError::Invalid(format!(
                "submission '{}' is {} and cannot be cancelled",
                submission.id, submission.status
            )));
        }
        self.publisher
            .publish(Event::CancelSubmission(CancelSubmissionEvent {
                submission_id: submission.id,
                requested_at: Utc::now(),
                delay_secs: 0,
            }))
            .await?;
        info!(submission_id = %submission.id, "submission cancel requested");
        Ok(())
    }

    /// Hide the submission immediately; the saga removes it once its runs stop.
    ///
    /// Repeating the command republishes the delete so an interrupted delete
    /// can be resumed.
    pub async fn delete_submission(&self, command: DeleteSubmissionCommand) -> Result<(), AppError> {
        let submission = self
            .submissions
            .get(&command.submission_id)
            .await?
            .filter(|s| s.workspace_id == command.workspace_id)
            .ok_or_else(|| AppError::NotFound(format!("submission '{}'", command.submission_id)))?;

        self.submissions.soft_delete(&submission.id, Utc::now()).await?;
        self.publisher
            .publish(Event::DeleteSubmission(DeleteSubmissionEvent {
                submission_id: submission.id,
                delay_secs: 0,
            }))
            .await?;
        info!(submission_id = %submission.id, "submission delete requested");
        Ok(())
    }

    pub async fn get_submission(
        &self,
        workspace_id: &str,
        submission_id: &Uuid,
    ) -> Result<SubmissionSummary, AppError> {
        let submission = self.visible(workspace_id, submission_id).await?;
        self.summarize(submission).await
    }

    /// Newest first.
    pub async fn list_submissions(&self, query: ListSubmissionsQuery) -> Result<Vec<SubmissionSummary>, AppError> {
        let submissions = self
            .submissions
            .list(&SubmissionFilter {
                workspace_id: Some(query.workspace_id),
                workflow_id: query.workflow_id,
                name: None,
                statuses: query.statuses,
                search_word: query.search_word,
                include_deleted: false,
                limit: query.limit,
                offset: query.offset,
            })
            .await?;

        let mut items = Vec::with_capacity(submissions.len());
        for submission in submissions {
            items.push(self.summarize(submission).await?);
        }
        Ok(items)
    }

    async fn visible(&self, workspace_id: &str, id: &Uuid) -> Result<Submission, AppError> {
        self.submissions
            .get(id)
            .await?
            .filter(|s| s.workspace_id == workspace_id && s.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("submission '{id}'")))
    }

    async fn summarize(&self, submission: Submission) -> Result<SubmissionSummary, AppError> {
        let run_counts = self.runs.count_by_status(&submission.id).await?;
        Ok(SubmissionSummary {
            submission,
            run_counts,
        })
    }
}

/// Shape checks that do not need storage.
fn validate_targets(command: &CreateSubmissionCommand) -> Result<(), AppError> {
    match command.submission_type {
        SubmissionType::DataModel => {
            if command.data_model_id.as_deref().is_none_or(str::is_empty) {
                return Err(AppError::Invalid("data_model submissions need a data_model_id".to_string()));
            }
            if command.data_model_row_ids.is_empty() {
                return Err(AppError::Invalid("data_model submissions need at least one row id".to_string()));
            }
            // Run ids derive from the row id; a repeated row would never be counted twice.
            let unique: BTreeSet<&String> = command.data_model_row_ids.iter().collect();
            if unique.len() != command.data_model_row_ids.len() {
                return Err(AppError::Invalid("data_model_row_ids contains duplicates".to_string()));
            }
        }
        SubmissionType::FilePath => {
            if command.inputs.is_empty() {
                return Err(AppError::Invalid("file_path submissions need at least one input set".to_string()));
            }
            if let Some((name, _)) = command.inputs.iter().find(|(_, v)| !v.is_object()) {
                return Err(AppError::Invalid(format!("input set '{name}' must be an object")));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_types::event::EventKind;
    use serde_json::json;

    use crate::memory::{MemoryRunRepository, MemorySubmissionRepository, MemoryWorkflowRepository};
    use crate::test_support::{Harness, SAMPLE_TABLE_ID, seed_run};

    type Service = SubmissionService<MemorySubmissionRepository, MemoryRunRepository, MemoryWorkflowRepository>;

    fn service(h: &Harness) -> Service {
        SubmissionService::new(h.submissions.clone(), h.runs.clone(), h.workflows.clone(), h.recorder.clone())
    }

    fn command(name: &str, rows: &[&str]) -> CreateSubmissionCommand {
        let mut inputs = Template::new();
        inputs.insert("wf.reads".into(), json!("this.fastq"));
        CreateSubmissionCommand {
            workspace_id: "ws-1".into(),
            name: name.into(),
            description: None,
            workflow_id: "wf-1".into(),
            workflow_version_id: None,
            submission_type: SubmissionType::DataModel,
            data_model_id: Some(SAMPLE_TABLE_ID.into()),
            data_model_row_ids: rows.iter().map(|r| r.to_string()).collect(),
            inputs,
            outputs: Template::new(),
            exposed_options: ExposedOptions::default(),
        }
    }

    #[tokio::test]
    async fn create_pins_latest_version_and_publishes() {
        let h = Harness::new().await;
        let id = service(&h).create_submission(command("first", &["s1", "s2"])).await.unwrap();

        let stored = h.submissions.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubmissionStatus::Pending);
        assert_eq!(stored.workflow_version_id, "v-1");
        assert_eq!(h.recorder.kinds(), vec![EventKind::CreateSubmission]);
    }

    #[tokio::test]
    async fn create_rejects_bad_commands() {
        let h = Harness::new().await;
        let svc = service(&h);

        let err = svc.create_submission(command("  ", &["s1"])).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));

        let err = svc.create_submission(command("rows", &[])).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));

        let err = svc.create_submission(command("dup-rows", &["s1", "s1"])).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));

        let mut other_ws = command("elsewhere", &["s1"]);
        other_ws.workspace_id = "ws-2".into();
        let err = svc.create_submission(other_ws).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let mut bad_version = command("version", &["s1"]);
        bad_version.workflow_version_id = Some("v-404".into());
        let err = svc.create_submission(bad_version).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let mut file_path = command("paths", &[]);
        file_path.submission_type = SubmissionType::FilePath;
        let err = svc.create_submission(file_path).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)), "{err:?}");

        assert!(h.recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_names_in_workspace() {
        let h = Harness::new().await;
        let svc = service(&h);
        svc.create_submission(command("align", &["s1"])).await.unwrap();

        let err = svc.create_submission(command("align", &["s2"])).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn cancel_requires_cancellable_status() {
        let h = Harness::new().await;
        let svc = service(&h);
        let id = svc.create_submission(command("align", &["s1"])).await.unwrap();
        h.recorder.take();

        let cancel = CancelSubmissionCommand {
            workspace_id: "ws-1".into(),
            submission_id: id,
        };
        svc.cancel_submission(cancel.clone()).await.unwrap();
        assert_eq!(h.recorder.kinds(), vec![EventKind::CancelSubmission]);

        let mut stored = h.submissions.get(&id).await.unwrap().unwrap();
        stored.status = SubmissionStatus::Finished;
        h.submissions.save(&stored).await.unwrap();
        let err = svc.cancel_submission(cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn delete_hides_submission_and_publishes() {
        let h = Harness::new().await;
        let svc = service(&h);
        let id = svc.create_submission(command("align", &["s1"])).await.unwrap();
        h.recorder.take();

        svc.delete_submission(DeleteSubmissionCommand {
            workspace_id: "ws-1".into(),
            submission_id: id,
        })
        .await
        .unwrap();

        assert_eq!(h.recorder.kinds(), vec![EventKind::DeleteSubmission]);
        assert!(matches!(svc.get_submission("ws-1", &id).await, Err(AppError::NotFound(_))));
        assert!(
            svc.list_submissions(ListSubmissionsQuery {
                workspace_id: "ws-1".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .is_empty()
        );
    }

    #[tokio::test]
    async fn list_reports_run_counts() {
        let h = Harness::new().await;
        let svc = service(&h);
        let id = svc.create_submission(command("align", &["s1", "s2"])).await.unwrap();
        let submission = h.submissions.get(&id).await.unwrap().unwrap();
        seed_run(&h, &submission, "s1", RunStatus::Running).await;
        seed_run(&h, &submission, "s2", RunStatus::Succeeded).await;

        let items = svc
            .list_submissions(ListSubmissionsQuery {
                workspace_id: "ws-1".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].run_counts.get(&RunStatus::Running), Some(&1));
        assert_eq!(items[0].run_counts.get(&RunStatus::Succeeded), Some(&1));
    }
}
