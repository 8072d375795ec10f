//! Submission repository trait definition.

use bioflow_types::error::RepositoryError;
use bioflow_types::submission::{Submission, SubmissionStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Query criteria for listing submissions.
#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub workspace_id: Option<String>,
    pub workflow_id: Option<String>,
    /// Exact name match.
    pub name: Option<String>,
    /// Match any of these statuses (empty = all).
    pub statuses: Vec<SubmissionStatus>,
    /// Case-insensitive substring of the name.
    pub search_word: Option<String>,
    /// Also return soft-deleted submissions.
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl SubmissionFilter {
    pub fn workspace(workspace_id: &str) -> Self {
        Self {
            workspace_id: Some(workspace_id.to_string()),
            ..Default::default()
        }
    }
}

/// Repository trait for submission persistence.
pub trait SubmissionRepository: Send + Sync {
    /// Upsert a submission by ID. An existing `deleted_at` is kept.
    fn save(
        &self,
        submission: &Submission,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Submission>, RepositoryError>> + Send;

    /// List submissions, newest first.
    fn list(
        &self,
        filter: &SubmissionFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Submission>, RepositoryError>> + Send;

    /// Stamp `deleted_at` if not already set. Returns `true` if it was stamped now.
    fn soft_delete(
        &self,
        id: &Uuid,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Remove the submission row. Returns `true` if it existed.
    fn delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
