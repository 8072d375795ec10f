//! Run repository trait definition.

use std::collections::BTreeMap;

use bioflow_types::error::RepositoryError;
use bioflow_types::run::{Run, RunStatus};
use uuid::Uuid;

/// Query criteria for listing runs.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub submission_id: Option<Uuid>,
    /// Match any of these statuses (empty = all).
    pub statuses: Vec<RunStatus>,
    /// Case-insensitive substring of the run name.
    pub search_word: Option<String>,
}

impl RunFilter {
    pub fn submission(submission_id: Uuid) -> Self {
        Self {
            submission_id: Some(submission_id),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[RunStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }
}

/// Repository trait for run persistence.
pub trait RunRepository: Send + Sync {
    /// Upsert a run by ID.
    fn save(&self, run: &Run) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Run>, RepositoryError>> + Send;

    /// List runs ordered by name.
    fn list(
        &self,
        filter: &RunFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Number of runs of a submission per status. Statuses with no runs are absent.
    fn count_by_status(
        &self,
        submission_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<BTreeMap<RunStatus, u64>, RepositoryError>> + Send;

    /// Returns `true` if the run existed.
    fn delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
