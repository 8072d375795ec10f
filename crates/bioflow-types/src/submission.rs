//! Submission domain types.
//!
//! A submission asks for one workflow version to be executed over a
//! selection of data. It fans out into runs and tracks their aggregate status.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An input or output template: workflow parameter name -> literal or reference.
pub type Template = BTreeMap<String, serde_json::Value>;

/// How the runs of a submission are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionType {
    /// One run per selected data-model row; inputs is a reference template.
    DataModel,
    /// One run per named entry of inputs; each entry is a template of its own.
    FilePath,
}

impl SubmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionType::DataModel => "data_model",
            SubmissionType::FilePath => "file_path",
        }
    }
}

impl FromStr for SubmissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data_model" => Ok(SubmissionType::DataModel),
            "file_path" => Ok(SubmissionType::FilePath),
            other => Err(format!("unknown submission type: '{other}'")),
        }
    }
}

/// Aggregate lifecycle of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Running,
    Cancelling,
    Cancelled,
    Finished,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Running => "running",
            SubmissionStatus::Cancelling => "cancelling",
            SubmissionStatus::Cancelled => "cancelled",
            SubmissionStatus::Finished => "finished",
        }
    }

    /// `Pending` and `Running` submissions accept a cancel request.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, SubmissionStatus::Pending | SubmissionStatus::Running)
    }

    /// No further transitions happen once a submission is cancelled or finished.
    pub fn is_finished(&self) -> bool {
        matches!(self, SubmissionStatus::Cancelled | SubmissionStatus::Finished)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubmissionStatus::Pending),
            "running" => Ok(SubmissionStatus::Running),
            "cancelling" => Ok(SubmissionStatus::Cancelling),
            "cancelled" => Ok(SubmissionStatus::Cancelled),
            "finished" => Ok(SubmissionStatus::Finished),
            other => Err(format!("unknown submission status: '{other}'")),
        }
    }
}

/// User-facing engine switches carried by a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedOptions {
    /// Let the engine reuse cached task results.
    #[serde(default)]
    pub read_from_cache: bool,
}

/// A request to execute a workflow over a selection of data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub workflow_id: String,
    pub workflow_version_id: String,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_model_id: Option<String>,
    #[serde(default)]
    pub data_model_row_ids: Vec<String>,
    pub submission_type: SubmissionType,
    pub inputs: Template,
    #[serde(default)]
    pub outputs: Template,
    #[serde(default)]
    pub exposed_options: ExposedOptions,
    pub status: SubmissionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    /// Set by the delete command; the saga hard-deletes afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Number of runs this submission fans out into once fully created.
    pub fn expected_run_count(&self) -> usize {
        match self.submission_type {
            SubmissionType::DataModel => self.data_model_row_ids.len(),
            SubmissionType::FilePath => self.inputs.len(),
        }
    }
}
