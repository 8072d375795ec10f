//! Request and response shapes exchanged with the workflow engine.
//!
//! States follow the GA4GH WES vocabulary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowFile;

/// Everything needed to start one run on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWorkflowRequest {
    pub workflow_type: String,
    pub workflow_type_version: String,
    /// Path of the entry file among `attachments`.
    pub workflow_url: String,
    pub attachments: Vec<WorkflowFile>,
    pub workflow_params: serde_json::Value,
    #[serde(default)]
    pub workflow_engine_parameters: serde_json::Value,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineRunState {
    Unknown,
    Queued,
    Initializing,
    Running,
    Paused,
    Complete,
    ExecutorError,
    SystemError,
    Canceled,
    Canceling,
    Preempted,
}

impl EngineRunState {
    pub fn is_error(&self) -> bool {
        matches!(self, EngineRunState::ExecutorError | EngineRunState::SystemError)
    }
}

/// Per-task log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineTaskLog {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Snapshot of a run as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub state: EngineRunState,
    #[serde(default)]
    pub outputs: serde_json::Value,
    #[serde(default)]
    pub task_logs: Vec<EngineTaskLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
