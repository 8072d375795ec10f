//! Workflow catalog repository trait definition.
//!
//! The saga only reads from the catalog. The write half exists so the
//! catalog can be populated from the CLI.

use bioflow_types::error::RepositoryError;
use bioflow_types::workflow::{Workflow, WorkflowFile, WorkflowVersion};

pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    fn get_workflow(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    fn get_version(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowVersion>, RepositoryError>> + Send;

    /// Source files of a version, ordered by path.
    fn list_files(
        &self,
        version_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowFile>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Upsert a workflow by ID.
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Upsert a version and replace its files.
    fn save_version(
        &self,
        version: &WorkflowVersion,
        files: &[WorkflowFile],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a workflow with its versions and files. Returns `true` if it existed.
    fn delete_workflow(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
