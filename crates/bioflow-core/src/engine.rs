//! Workflow engine client trait.

use bioflow_types::engine::{RunLog, RunWorkflowRequest};
use bioflow_types::error::EngineError;

/// Minimal surface of a WES-like engine the run saga relies on.
pub trait EngineClient: Send + Sync {
    /// Start a run and return the engine's run id.
    fn run_workflow(
        &self,
        request: &RunWorkflowRequest,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;

    fn get_run_log(
        &self,
        engine_run_id: &str,
    ) -> impl std::future::Future<Output = Result<RunLog, EngineError>> + Send;

    fn cancel_run(
        &self,
        engine_run_id: &str,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;
}
