use bioflow_types::error::RepositoryError;
use bioflow_types::workflow::{Workflow, WorkflowFile, WorkflowVersion};
use dashmap::DashMap;

use crate::repository::workflow::WorkflowRepository;

#[derive(Debug, Default)]
pub struct MemoryWorkflowRepository {
    workflows: DashMap<String, Workflow>,
    versions: DashMap<String, WorkflowVersion>,
    files: DashMap<String, Vec<WorkflowFile>>,
}

impl MemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowRepository for MemoryWorkflowRepository {
    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.get(id).map(|w| w.value().clone()))
    }

    async fn get_version(&self, id: &str) -> Result<Option<WorkflowVersion>, RepositoryError> {
        Ok(self.versions.get(id).map(|v| v.value().clone()))
    }

    async fn list_files(&self, version_id: &str) -> Result<Vec<WorkflowFile>, RepositoryError> {
        let mut files = self
            .files
            .get(version_id)
            .map(|f| f.value().clone())
            .unwrap_or_default();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn save_version(
        &self,
        version: &WorkflowVersion,
        files: &[WorkflowFile],
    ) -> Result<(), RepositoryError> {
        self.versions.insert(version.id.clone(), version.clone());
        self.files.insert(version.id.clone(), files.to_vec());
        Ok(())
    }

    async fn delete_workflow(&self, id: &str) -> Result<bool, RepositoryError> {
        let existed = self.workflows.remove(id).is_some();
        let version_ids: Vec<String> = self
            .versions
            .iter()
            .filter(|v| v.workflow_id == id)
            .map(|v| v.id.clone())
            .collect();
        for version_id in version_ids {
            self.versions.remove(&version_id);
            self.files.remove(&version_id);
        }
        Ok(existed)
    }
}
