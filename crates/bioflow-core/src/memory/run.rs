use std::collections::BTreeMap;

use bioflow_types::error::RepositoryError;
use bioflow_types::run::{Run, RunStatus, Task};
use dashmap::DashMap;
use uuid::Uuid;

use super::matches_search;
use crate::repository::run::{RunFilter, RunRepository};
use crate::repository::task::TaskRepository;

#[derive(Debug, Default)]
pub struct MemoryRunRepository {
    runs: DashMap<Uuid, Run>,
}

impl MemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunRepository for MemoryRunRepository {
    async fn save(&self, run: &Run) -> Result<(), RepositoryError> {
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<Run>, RepositoryError> {
        Ok(self.runs.get(id).map(|r| r.value().clone()))
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<Run>, RepositoryError> {
        let mut runs: Vec<Run> = self
            .runs
            .iter()
            .filter(|r| filter.submission_id.is_none_or(|id| r.submission_id == id))
            .filter(|r| filter.statuses.is_empty() || filter.statuses.contains(&r.status))
            .filter(|r| matches_search(&r.name, filter.search_word.as_deref()))
            .map(|r| r.value().clone())
            .collect();
        runs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(runs)
    }

    async fn count_by_status(
        &self,
        submission_id: &Uuid,
    ) -> Result<BTreeMap<RunStatus, u64>, RepositoryError> {
        let mut counts = BTreeMap::new();
        for run in self.runs.iter().filter(|r| &r.submission_id == submission_id) {
            *counts.entry(run.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.runs.remove(id).is_some())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTaskRepository {
    tasks: DashMap<(Uuid, String), Task>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskRepository for MemoryTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), RepositoryError> {
        self.tasks
            .insert((task.run_id, task.name.clone()), task.clone());
        Ok(())
    }

    async fn list(&self, run_id: &Uuid) -> Result<Vec<Task>, RepositoryError> {
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| &t.run_id == run_id)
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.name.cmp(&b.name)));
        Ok(tasks)
    }

    async fn delete_by_run(&self, run_id: &Uuid) -> Result<u64, RepositoryError> {
        let before = self.tasks.len();
        self.tasks.retain(|(id, _), _| id != run_id);
        Ok((before - self.tasks.len()) as u64)
    }
}
