//! Task repository trait definition.

use bioflow_types::error::RepositoryError;
use bioflow_types::run::Task;
use uuid::Uuid;

/// Repository trait for task persistence. Tasks are keyed by (run_id, name).
pub trait TaskRepository: Send + Sync {
    /// Upsert by (run_id, name).
    fn save(&self, task: &Task) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Tasks of a run ordered by start time.
    fn list(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, RepositoryError>> + Send;

    /// Returns the number of deleted tasks.
    fn delete_by_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
