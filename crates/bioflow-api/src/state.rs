//! Application state wiring all services together.
//!
//! Services and saga handlers are generic over the core ports; AppState pins
//! them to the SQLite repositories and the WES engine client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use bioflow_core::event::{EventBus, EventPublisher, RunningSet};
use bioflow_core::saga::{SagaDeps, register_handlers};
use bioflow_core::service::{CatalogService, RunService, SubmissionService};
use bioflow_infra::config::{load_global_config, resolve_data_dir, resolve_database_url};
use bioflow_infra::engine::WesEngineClient;
use bioflow_infra::sqlite::{
    DatabasePool, SqliteDataModelService, SqliteEventStore, SqliteRunRepository, SqliteSubmissionRepository,
    SqliteTaskRepository, SqliteWorkflowRepository,
};
use bioflow_types::config::GlobalConfig;

/// Concrete type aliases for the generics pinned to infra implementations.
pub type ConcreteBus = EventBus<SqliteEventStore>;

pub type ConcreteSubmissionService =
    SubmissionService<SqliteSubmissionRepository, SqliteRunRepository, SqliteWorkflowRepository>;

pub type ConcreteRunService = RunService<SqliteSubmissionRepository, SqliteRunRepository, SqliteTaskRepository>;

pub type ConcreteCatalogService = CatalogService<SqliteWorkflowRepository, SqliteDataModelService>;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<ConcreteBus>,
    pub submission_service: Arc<ConcreteSubmissionService>,
    pub run_service: Arc<ConcreteRunService>,
    pub catalog_service: Arc<ConcreteCatalogService>,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load config, open the database and wire the saga onto the bus.
    ///
    /// The bus is not started here. Commands other than `serve` only persist
    /// events for a running server to pick up.
    pub async fn init(workers: Option<usize>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let mut config = load_global_config(&data_dir).await;
        if let Some(workers) = workers {
            config.bus.workers = workers;
        }

        let db_url = resolve_database_url(&config, &data_dir);
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("failed to open database {db_url}"))?;

        let submissions = Arc::new(SqliteSubmissionRepository::new(db_pool.clone()));
        let runs = Arc::new(SqliteRunRepository::new(db_pool.clone()));
        let tasks = Arc::new(SqliteTaskRepository::new(db_pool.clone()));
        let workflows = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let data_model = Arc::new(SqliteDataModelService::new(db_pool.clone()));
        let engine = Arc::new(
            WesEngineClient::from_config(&config.engine).context("failed to create workflow engine client")?,
        );

        let bus = Arc::new(EventBus::new(
            Arc::new(SqliteEventStore::new(db_pool.clone())),
            config.bus.clone(),
            RunningSet::new(),
        ));
        register_handlers(
            &bus,
            &SagaDeps {
                submissions: submissions.clone(),
                runs: runs.clone(),
                tasks: tasks.clone(),
                workflows: workflows.clone(),
                data_model: data_model.clone(),
                engine,
            },
        );
        let publisher: Arc<dyn EventPublisher> = bus.clone();

        let submission_service =
            SubmissionService::new(submissions.clone(), runs.clone(), workflows.clone(), publisher.clone());
        let run_service = RunService::new(submissions, runs, tasks, publisher.clone());
        let catalog_service = CatalogService::new(workflows, data_model, publisher);

        tracing::debug!(data_dir = %data_dir.display(), database = %db_url, "application state ready");

        Ok(Self {
            bus,
            submission_service: Arc::new(submission_service),
            run_service: Arc::new(run_service),
            catalog_service: Arc::new(catalog_service),
            config,
            data_dir,
        })
    }
}
