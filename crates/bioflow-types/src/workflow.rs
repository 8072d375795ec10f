//! Workflow catalog types and the engine-facing run configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::submission::ExposedOptions;

/// A registered workflow in a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An immutable version of a workflow's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: String,
    pub workflow_id: String,
    /// Workflow language, e.g. `WDL` or `NEXTFLOW`.
    pub language: String,
    pub language_version: String,
    pub main_workflow_path: String,
    pub created_at: DateTime<Utc>,
}

/// One source file belonging to a workflow version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub path: String,
    pub content: String,
}

/// Everything the engine needs to execute a workflow version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub language: String,
    pub version: String,
    pub main_workflow_path: String,
    #[serde(default)]
    pub files: Vec<WorkflowFile>,
    #[serde(default)]
    pub engine_params: serde_json::Value,
}

impl RunConfig {
    pub fn new(version: &WorkflowVersion, files: Vec<WorkflowFile>, options: &ExposedOptions) -> Self {
        Self {
            language: version.language.clone(),
            version: version.language_version.clone(),
            main_workflow_path: version.main_workflow_path.clone(),
            files,
            engine_params: serde_json::json!({ "read_from_cache": options.read_from_cache }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_carries_cache_flag() {
        let version = WorkflowVersion {
            id: "v1".into(),
            workflow_id: "wf".into(),
            language: "WDL".into(),
            language_version: "1.0".into(),
            main_workflow_path: "main.wdl".into(),
            created_at: Utc::now(),
        };
        let files = vec![WorkflowFile {
            path: "main.wdl".into(),
            content: "workflow w {}".into(),
        }];
        let config = RunConfig::new(&version, files, &ExposedOptions { read_from_cache: true });

        assert_eq!(config.language, "WDL");
        assert_eq!(config.version, "1.0");
        assert_eq!(config.files.len(), 1);
        assert_eq!(config.engine_params["read_from_cache"], serde_json::json!(true));
    }
}
