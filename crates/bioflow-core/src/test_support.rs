//! Fixtures shared by the saga tests: in-memory ports, a scripted engine and
//! a publisher that records instead of dispatching.

use std::sync::{Arc, Mutex};

use bioflow_types::config::EventBusConfig;
use bioflow_types::data_model::{DataModel, DataModelType};
use bioflow_types::engine::{EngineRunState, RunLog, RunWorkflowRequest};
use bioflow_types::error::{AppError, EngineError};
use bioflow_types::event::{CreateRunsEvent, Event, EventFilter, EventKind, EventStatus};
use bioflow_types::run::{Run, RunStatus};
use bioflow_types::submission::{ExposedOptions, Submission, SubmissionStatus, SubmissionType, Template};
use bioflow_types::workflow::{RunConfig, Workflow, WorkflowFile, WorkflowVersion};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::data_model::DataModelService;
use crate::engine::EngineClient;
use crate::event::{BoxFuture, EventBus, EventPublisher, ProcessOutcome, RunningSet};
use crate::memory::{
    MemoryDataModelService, MemoryEventStore, MemoryRunRepository, MemorySubmissionRepository,
    MemoryTaskRepository, MemoryWorkflowRepository,
};
use crate::repository::event::EventStore;
use crate::repository::run::RunRepository;
use crate::repository::submission::SubmissionRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::saga::{SagaDeps, register_handlers};
use crate::service::submission::{CreateSubmissionCommand, SubmissionService};

pub const SAMPLE_TABLE_ID: &str = "t-sample";
pub const WORKSPACE_TABLE_ID: &str = "t-workspace";

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

/// Keeps published events for inspection.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    /// Drain everything recorded so far.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    /// Drain and return only the kinds.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.take().iter().map(Event::kind).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: Event) -> BoxFuture<'_, Result<Uuid, AppError>> {
        self.events.lock().unwrap().push(event);
        Box::pin(async { Ok(Uuid::now_v7()) })
    }
}

// ---------------------------------------------------------------------------
// ScriptedEngine
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct EngineScript {
    state: EngineRunState,
    outputs: Value,
    next_submit_error: Option<EngineError>,
    next_cancel_error: Option<EngineError>,
    next_log_error: Option<EngineError>,
    submitted: Vec<RunWorkflowRequest>,
    submit_attempts: usize,
    cancelled: Vec<String>,
}

/// Engine double whose answers are set by the test.
#[derive(Debug)]
pub struct ScriptedEngine {
    script: Mutex<EngineScript>,
    logs: DashMap<String, RunLog>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            script: Mutex::new(EngineScript {
                state: EngineRunState::Running,
                outputs: json!({}),
                next_submit_error: None,
                next_cancel_error: None,
                next_log_error: None,
                submitted: Vec::new(),
                submit_attempts: 0,
                cancelled: Vec::new(),
            }),
            logs: DashMap::new(),
        }
    }
}

impl ScriptedEngine {
    /// State reported for runs submitted from now on.
    pub fn hold_in_state(&self, state: EngineRunState) {
        self.script.lock().unwrap().state = state;
    }

    /// Outputs reported for runs submitted from now on.
    pub fn set_outputs(&self, outputs: Value) {
        self.script.lock().unwrap().outputs = outputs;
    }

    pub fn fail_next_submit(&self, err: EngineError) {
        self.script.lock().unwrap().next_submit_error = Some(err);
    }

    pub fn fail_next_cancel(&self, err: EngineError) {
        self.script.lock().unwrap().next_cancel_error = Some(err);
    }

    pub fn fail_next_log(&self, err: EngineError) {
        self.script.lock().unwrap().next_log_error = Some(err);
    }

    /// Accepted submissions, in order.
    pub fn submitted(&self) -> Vec<RunWorkflowRequest> {
        self.script.lock().unwrap().submitted.clone()
    }

    pub fn submit_attempts(&self) -> usize {
        self.script.lock().unwrap().submit_attempts
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.script.lock().unwrap().cancelled.clone()
    }

    pub fn set_log(&self, engine_run_id: &str, mut log: RunLog) {
        log.run_id = engine_run_id.to_string();
        self.logs.insert(engine_run_id.to_string(), log);
    }
}

impl EngineClient for ScriptedEngine {
    async fn run_workflow(&self, request: &RunWorkflowRequest) -> Result<String, EngineError> {
        let (engine_run_id, state, outputs) = {
            let mut script = self.script.lock().unwrap();
            script.submit_attempts += 1;
            if let Some(err) = script.next_submit_error.take() {
                return Err(err);
            }
            script.submitted.push(request.clone());
            let id = format!("engine-{}", script.submitted.len());
            (id, script.state, script.outputs.clone())
        };
        self.set_log(
            &engine_run_id,
            RunLog {
                run_id: String::new(),
                state,
                outputs,
                task_logs: Vec::new(),
                log: None,
                message: None,
            },
        );
        Ok(engine_run_id)
    }

    async fn get_run_log(&self, engine_run_id: &str) -> Result<RunLog, EngineError> {
        if let Some(err) = self.script.lock().unwrap().next_log_error.take() {
            return Err(err);
        }
        self.logs
            .get(engine_run_id)
            .map(|log| log.value().clone())
            .ok_or_else(|| EngineError::NotFound(engine_run_id.to_string()))
    }

    async fn cancel_run(&self, engine_run_id: &str) -> Result<(), EngineError> {
        {
            let mut script = self.script.lock().unwrap();
            script.cancelled.push(engine_run_id.to_string());
            if let Some(err) = script.next_cancel_error.take() {
                return Err(err);
            }
        }
        if let Some(mut log) = self.logs.get_mut(engine_run_id) {
            log.state = EngineRunState::Canceled;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Bus plus every in-memory port, seeded with one workflow and two tables.
pub struct Harness {
    pub bus: Arc<EventBus<MemoryEventStore>>,
    pub store: Arc<MemoryEventStore>,
    pub submissions: Arc<MemorySubmissionRepository>,
    pub runs: Arc<MemoryRunRepository>,
    pub tasks: Arc<MemoryTaskRepository>,
    pub workflows: Arc<MemoryWorkflowRepository>,
    pub data_model: Arc<MemoryDataModelService>,
    pub engine: Arc<ScriptedEngine>,
    pub recorder: Arc<RecordingPublisher>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryEventStore::new());
        let config = EventBusConfig {
            max_retries: 3,
            ..Default::default()
        };
        let bus = Arc::new(EventBus::new(store.clone(), config, RunningSet::new()));

        let h = Self {
            bus,
            store,
            submissions: Arc::new(MemorySubmissionRepository::new()),
            runs: Arc::new(MemoryRunRepository::new()),
            tasks: Arc::new(MemoryTaskRepository::new()),
            workflows: Arc::new(MemoryWorkflowRepository::new()),
            data_model: Arc::new(MemoryDataModelService::new()),
            engine: Arc::new(ScriptedEngine::default()),
            recorder: Arc::new(RecordingPublisher::default()),
        };

        register_handlers(
            &h.bus,
            &SagaDeps {
                submissions: h.submissions.clone(),
                runs: h.runs.clone(),
                tasks: h.tasks.clone(),
                workflows: h.workflows.clone(),
                data_model: h.data_model.clone(),
                engine: h.engine.clone(),
            },
        );
        h.seed().await;
        h
    }

    async fn seed(&self) {
        let now = Utc::now();
        self.workflows
            .save_workflow(&Workflow {
                id: "wf-1".into(),
                workspace_id: "ws-1".into(),
                name: "align".into(),
                latest_version_id: Some("v-1".into()),
                created_at: now,
            })
            .await
            .unwrap();
        self.workflows
            .save_version(
                &WorkflowVersion {
                    id: "v-1".into(),
                    workflow_id: "wf-1".into(),
                    language: "WDL".into(),
                    language_version: "1.0".into(),
                    main_workflow_path: "main.wdl".into(),
                    created_at: now,
                },
                &[WorkflowFile {
                    path: "main.wdl".into(),
                    content: "workflow wf {}".into(),
                }],
            )
            .await
            .unwrap();

        self.data_model
            .import_table(
                &DataModel {
                    id: SAMPLE_TABLE_ID.into(),
                    workspace_id: "ws-1".into(),
                    name: "sample".into(),
                    kind: DataModelType::Entity,
                    headers: vec!["sample_id".into(), "fastq".into()],
                },
                &[
                    vec!["s1".into(), "f1.fq".into()],
                    vec!["s2".into(), "f2.fq".into()],
                    vec!["s3".into(), "f3.fq".into()],
                ],
            )
            .await
            .unwrap();
        self.data_model
            .import_table(
                &DataModel {
                    id: WORKSPACE_TABLE_ID.into(),
                    workspace_id: "ws-1".into(),
                    name: "workspace".into(),
                    kind: DataModelType::Workspace,
                    headers: vec!["workspace_id".into(), "genome".into()],
                },
                &[vec!["ws-1".into(), "hg38.fa".into()]],
            )
            .await
            .unwrap();
    }

    /// Service wired to the real bus.
    pub fn submission_service(
        &self,
    ) -> SubmissionService<MemorySubmissionRepository, MemoryRunRepository, MemoryWorkflowRepository> {
        SubmissionService::new(
            self.submissions.clone(),
            self.runs.clone(),
            self.workflows.clone(),
            self.bus.clone(),
        )
    }

    /// Create a data-model submission over `rows` of the sample table through the service.
    pub async fn create_submission(&self, rows: &[&str]) -> Uuid {
        let mut inputs = Template::new();
        inputs.insert("wf.reads".into(), json!("this.fastq"));
        inputs.insert("wf.ref".into(), json!("workspace.genome"));
        let mut outputs = Template::new();
        outputs.insert("wf.bam".into(), json!("this.bam"));

        self.submission_service()
            .create_submission(CreateSubmissionCommand {
                workspace_id: "ws-1".into(),
                name: format!("submission-{}", Uuid::now_v7()),
                description: None,
                workflow_id: "wf-1".into(),
                workflow_version_id: None,
                submission_type: SubmissionType::DataModel,
                data_model_id: Some(SAMPLE_TABLE_ID.into()),
                data_model_row_ids: rows.iter().map(|r| r.to_string()).collect(),
                inputs,
                outputs,
                exposed_options: ExposedOptions::default(),
            })
            .await
            .unwrap()
    }

    /// Process pending events inline, without workers, until the saga settles.
    ///
    /// Scheduled events are pulled forward so delays do not slow tests down.
    /// Stops once a round only produced delayed redeliveries, i.e. the saga
    /// is waiting on the engine.
    pub async fn drain(&self) {
        for _ in 0..200 {
            let pending = self
                .store
                .search(&EventFilter {
                    statuses: vec![EventStatus::Pending],
                    ..Default::default()
                })
                .await
                .unwrap();
            if pending.is_empty() {
                return;
            }

            let now = Utc::now();
            let mut all_delayed = true;
            for record in pending {
                if record.scheduled_at > now {
                    self.store
                        .reschedule(&record.id, now, record.retry_count)
                        .await
                        .unwrap();
                }
                let outcome = self.bus.process_event(record.id).await.unwrap();
                if outcome != ProcessOutcome::Delayed {
                    all_delayed = false;
                }
            }
            if all_delayed {
                return;
            }
        }
        panic!("saga did not settle");
    }

    /// Point `run` at a scripted engine run reporting `log`. Returns the engine id.
    pub async fn attach_engine_run(&self, run: &Run, log: RunLog) -> String {
        let engine_run_id = run
            .engine_run_id
            .clone()
            .unwrap_or_else(|| format!("engine-{}", run.name));
        self.engine.set_log(&engine_run_id, log);
        let mut run = run.clone();
        run.engine_run_id = Some(engine_run_id.clone());
        self.runs.save(&run).await.unwrap();
        engine_run_id
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A pending data-model submission over `rows`, saved directly without events.
pub async fn sample_submission(h: &Harness, rows: &[&str]) -> Submission {
    let mut inputs = Template::new();
    inputs.insert("wf.reads".into(), json!("this.fastq"));
    inputs.insert("wf.ref".into(), json!("workspace.genome"));
    let mut outputs = Template::new();
    outputs.insert("wf.bam".into(), json!("this.bam"));
    outputs.insert("wf.stats".into(), json!("this.stats"));

    let submission = Submission {
        id: Uuid::now_v7(),
        name: format!("sample-{}", Uuid::now_v7()),
        description: None,
        workflow_id: "wf-1".into(),
        workflow_version_id: "v-1".into(),
        workspace_id: "ws-1".into(),
        data_model_id: Some(SAMPLE_TABLE_ID.into()),
        data_model_row_ids: rows.iter().map(|r| r.to_string()).collect(),
        submission_type: SubmissionType::DataModel,
        inputs,
        outputs,
        exposed_options: ExposedOptions::default(),
        status: SubmissionStatus::Pending,
        start_time: Utc::now(),
        finish_time: None,
        deleted_at: None,
    };
    h.submissions.save(&submission).await.unwrap();
    submission
}

/// A run of `submission` for row `name`. Anything past `Pending` has an engine id.
pub async fn seed_run(h: &Harness, submission: &Submission, name: &str, status: RunStatus) -> Run {
    let run = Run {
        id: Run::derive_id(submission.id, name),
        name: name.into(),
        submission_id: submission.id,
        inputs: json!({"wf.reads": format!("{name}.fq")}),
        outputs: None,
        engine_run_id: (status != RunStatus::Pending).then(|| format!("engine-{name}")),
        status,
        log: None,
        message: None,
        start_time: Utc::now(),
        finish_time: status.is_finished().then(Utc::now),
    };
    h.runs.save(&run).await.unwrap();
    run
}

pub fn sample_run_config() -> RunConfig {
    RunConfig {
        language: "WDL".into(),
        version: "1.0".into(),
        main_workflow_path: "main.wdl".into(),
        files: vec![WorkflowFile {
            path: "main.wdl".into(),
            content: "workflow wf {}".into(),
        }],
        engine_params: json!({"read_from_cache": false}),
    }
}

pub fn create_runs_event(submission: &Submission) -> CreateRunsEvent {
    CreateRunsEvent {
        submission_id: submission.id,
        workspace_id: submission.workspace_id.clone(),
        submission_type: submission.submission_type,
        data_model_id: submission.data_model_id.clone(),
        data_model_row_ids: submission.data_model_row_ids.clone(),
        inputs: submission.inputs.clone(),
        outputs: submission.outputs.clone(),
        run_config: sample_run_config(),
    }
}
