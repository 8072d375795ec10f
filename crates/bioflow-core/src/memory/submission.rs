use bioflow_types::error::RepositoryError;
use bioflow_types::submission::Submission;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::matches_search;
use crate::repository::submission::{SubmissionFilter, SubmissionRepository};

#[derive(Debug, Default)]
pub struct MemorySubmissionRepository {
    submissions: DashMap<Uuid, Submission>,
}

impl MemorySubmissionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches(submission: &Submission, filter: &SubmissionFilter) -> bool {
    if !filter.include_deleted && submission.deleted_at.is_some() {
        return false;
    }
    if let Some(ws) = &filter.workspace_id {
        if &submission.workspace_id != ws {
            return false;
        }
    }
    if let Some(wf) = &filter.workflow_id {
        if &submission.workflow_id != wf {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        if &submission.name != name {
            return false;
        }
    }
    if !filter.statuses.is_empty() && !filter.statuses.contains(&submission.status) {
        return false;
    }
    matches_search(&submission.name, filter.search_word.as_deref())
}

impl SubmissionRepository for MemorySubmissionRepository {
    async fn save(&self, submission: &Submission) -> Result<(), RepositoryError> {
        let mut next = submission.clone();
        if let Some(existing) = self.submissions.get(&submission.id) {
            next.deleted_at = existing.deleted_at.or(next.deleted_at);
        }
        self.submissions.insert(next.id, next);
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Submission>, RepositoryError> {
        Ok(self.submissions.get(id).map(|s| s.value().clone()))
    }

    async fn list(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>, RepositoryError> {
        let mut items: Vec<Submission> = self
            .submissions
            .iter()
            .filter(|s| matches(s, filter))
            .map(|s| s.value().clone())
            .collect();
        items.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));

        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(items
            .into_iter()
            .skip(filter.offset as usize)
            .take(limit)
            .collect())
    }

    async fn soft_delete(&self, id: &Uuid, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        match self.submissions.get_mut(id) {
            Some(mut entry) if entry.deleted_at.is_none() => {
                entry.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.submissions.remove(id).is_some())
    }
}
