use std::sync::Arc;

use bioflow_types::error::AppError;
use bioflow_types::event::{CreateRunsEvent, Event, SubmitRunEvent};
use bioflow_types::run::{Run, RunStatus};
use bioflow_types::submission::{SubmissionType, Template};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::data_model::DataModelService;
use crate::event::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError, unexpected_event};
use crate::repository::run::RunRepository;
use crate::repository::submission::SubmissionRepository;
use crate::resolver::DataList;

/// Materializes one run per selected row (or named input set).
pub struct CreateRunsHandler<S, R, D> {
    submissions: Arc<S>,
    runs: Arc<R>,
    data_model: Arc<D>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S, R, D> CreateRunsHandler<S, R, D>
where
    S: SubmissionRepository,
    R: RunRepository,
    D: DataModelService,
{
    pub fn new(
        submissions: Arc<S>,
        runs: Arc<R>,
        data_model: Arc<D>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            submissions,
            runs,
            data_model,
            publisher,
        }
    }

    /// Render the concrete inputs of every run before anything is stored.
    async fn render_inputs(&self, event: &CreateRunsEvent) -> Result<Vec<(String, Value)>, HandlerError> {
        match event.submission_type {
            SubmissionType::DataModel => {
                let data =
                    DataList::load(&*self.data_model, &event.workspace_id, event.data_model_id.as_deref())
                        .await?;
                event
                    .data_model_row_ids
                    .iter()
                    .map(|row_id| Ok((row_id.clone(), Value::Object(data.render(&event.inputs, Some(row_id))?))))
                    .collect()
            }
            SubmissionType::FilePath => {
                let data = DataList::load(&*self.data_model, &event.workspace_id, None).await?;
                event
                    .inputs
                    .iter()
                    .map(|(name, value)| {
                        let template: Template = serde_json::from_value(value.clone()).map_err(|_| {
                            AppError::Invalid(format!("inputs for '{name}' must be an object"))
                        })?;
                        Ok((name.clone(), Value::Object(data.render(&template, None)?)))
                    })
                    .collect()
            }
        }
    }

    async fn create(&self, event: &CreateRunsEvent) -> Result<(), HandlerError> {
        match self.submissions.get(&event.submission_id).await? {
            Some(submission) if !submission.status.is_finished() => {}
            _ => {
                debug!(submission_id = %event.submission_id, "submission gone or finished, no runs created");
                return Ok(());
            }
        }

        let targets = self.render_inputs(event).await?;
        let mut created = 0usize;
        let mut resumed = 0usize;
        for (name, inputs) in targets {
            let run_id = Run::derive_id(event.submission_id, &name);
            match self.runs.get(&run_id).await? {
                None => {
                    let run = Run {
                        id: run_id,
                        name,
                        submission_id: event.submission_id,
                        inputs,
                        outputs: None,
                        engine_run_id: None,
                        status: RunStatus::Pending,
                        log: None,
                        message: None,
                        start_time: Utc::now(),
                        finish_time: None,
                    };
                    self.runs.save(&run).await?;
                    created += 1;
                }
                Some(existing) if existing.status == RunStatus::Pending && existing.engine_run_id.is_none() => {
                    resumed += 1;
                }
                Some(_) => continue,
            }
            self.publisher
                .publish(Event::SubmitRun(SubmitRunEvent {
                    submission_id: event.submission_id,
                    run_id,
                    run_config: event.run_config.clone(),
                    delay_secs: 0,
                }))
                .await?;
        }

        info!(submission_id = %event.submission_id, created, resumed, "runs created");
        Ok(())
    }
}

impl<S, R, D> EventHandler for CreateRunsHandler<S, R, D>
where
    S: SubmissionRepository,
    R: RunRepository,
    D: DataModelService,
{
    fn name(&self) -> &'static str {
        "create_runs"
    }

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            match event {
                Event::CreateRuns(e) => self.create(e).await,
                other => Err(unexpected_event(self.name(), other)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_types::event::EventKind;
    use serde_json::json;

    use crate::memory::{MemoryDataModelService, MemoryRunRepository, MemorySubmissionRepository};
    use crate::repository::run::RunFilter;
    use crate::test_support::{Harness, create_runs_event, sample_submission};

    type Handler = CreateRunsHandler<MemorySubmissionRepository, MemoryRunRepository, MemoryDataModelService>;

    fn handler(h: &Harness) -> Handler {
        CreateRunsHandler::new(
            h.submissions.clone(),
            h.runs.clone(),
            h.data_model.clone(),
            h.recorder.clone(),
        )
    }

    #[tokio::test]
    async fn creates_one_run_per_row_with_resolved_inputs() {
        let h = Harness::new().await;
        let submission = sample_submission(&h, &["s1", "s3"]).await;

        handler(&h).create(&create_runs_event(&submission)).await.unwrap();

        let runs = h.runs.list(&RunFilter::submission(submission.id)).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].name, "s1");
        assert_eq!(runs[0].inputs, json!({"wf.reads": "f1.fq", "wf.ref": "hg38.fa"}));
        assert_eq!(runs[1].inputs["wf.reads"], json!("f3.fq"));
        assert_eq!(runs[0].id, Run::derive_id(submission.id, "s1"));
        assert_eq!(h.recorder.kinds(), vec![EventKind::SubmitRun, EventKind::SubmitRun]);
    }

    #[tokio::test]
    async fn redelivery_does_not_duplicate_runs() {
        let h = Harness::new().await;
        let submission = sample_submission(&h, &["s1", "s2"]).await;
        let event = create_runs_event(&submission);
        let handler = handler(&h);

        handler.create(&event).await.unwrap();
        h.recorder.take();

        // s1 got submitted in the meantime; s2 is still waiting for its engine id.
        let mut s1 = h.runs.get(&Run::derive_id(submission.id, "s1")).await.unwrap().unwrap();
        s1.engine_run_id = Some("engine-1".into());
        h.runs.save(&s1).await.unwrap();

        handler.create(&event).await.unwrap();

        let runs = h.runs.list(&RunFilter::submission(submission.id)).await.unwrap();
        assert_eq!(runs.len(), 2);
        let events = h.recorder.take();
        assert_eq!(events.len(), 1);
        let Event::SubmitRun(submit) = &events[0] else {
            panic!("expected SubmitRun");
        };
        assert_eq!(submit.run_id, Run::derive_id(submission.id, "s2"));
    }

    #[tokio::test]
    async fn file_path_inputs_create_named_runs() {
        let h = Harness::new().await;
        let mut submission = sample_submission(&h, &[]).await;
        submission.submission_type = SubmissionType::FilePath;
        submission.data_model_id = None;
        submission.inputs = [
            ("first".to_string(), json!({"wf.reads": "a.fq", "wf.ref": "workspace.genome"})),
            ("second".to_string(), json!({"wf.reads": "b.fq"})),
        ]
        .into_iter()
        .collect();
        h.submissions.save(&submission).await.unwrap();

        handler(&h).create(&create_runs_event(&submission)).await.unwrap();

        let runs = h.runs.list(&RunFilter::submission(submission.id)).await.unwrap();
        assert_eq!(runs.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["first", "second"]);
        assert_eq!(runs[0].inputs, json!({"wf.reads": "a.fq", "wf.ref": "hg38.fa"}));
    }

    #[tokio::test]
    async fn unresolvable_reference_creates_nothing() {
        let h = Harness::new().await;
        let mut submission = sample_submission(&h, &["s1", "missing"]).await;
        submission.inputs.insert("wf.extra".into(), json!("this.fastq"));
        h.submissions.save(&submission).await.unwrap();

        let err = handler(&h).create(&create_runs_event(&submission)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(h.runs.list(&RunFilter::submission(submission.id)).await.unwrap().is_empty());
        assert!(h.recorder.kinds().is_empty());
    }
}
