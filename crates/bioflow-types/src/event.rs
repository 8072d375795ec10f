//! Durable event types driving the submission saga.
//!
//! An [`Event`] is a tagged union: [`EventKind`] is the string tag stored next
//! to the JSON payload, and each variant carries its own payload struct.
//! [`EventRecord`] is the persisted envelope with the bus's scheduling
//! metadata.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::submission::{SubmissionType, Template};
use crate::workflow::RunConfig;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// The tag identifying which payload an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CreateSubmission,
    CancelSubmission,
    DeleteSubmission,
    SyncSubmission,
    CreateRuns,
    SubmitRun,
    SyncRun,
    CancelRun,
    DeleteRun,
    WorkflowDeleted,
    WorkspaceDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::CreateSubmission,
        EventKind::CancelSubmission,
        EventKind::DeleteSubmission,
        EventKind::SyncSubmission,
        EventKind::CreateRuns,
        EventKind::SubmitRun,
        EventKind::SyncRun,
        EventKind::CancelRun,
        EventKind::DeleteRun,
        EventKind::WorkflowDeleted,
        EventKind::WorkspaceDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CreateSubmission => "create_submission",
            EventKind::CancelSubmission => "cancel_submission",
            EventKind::DeleteSubmission => "delete_submission",
            EventKind::SyncSubmission => "sync_submission",
            EventKind::CreateRuns => "create_runs",
            EventKind::SubmitRun => "submit_run",
            EventKind::SyncRun => "sync_run",
            EventKind::CancelRun => "cancel_run",
            EventKind::DeleteRun => "delete_run",
            EventKind::WorkflowDeleted => "workflow_deleted",
            EventKind::WorkspaceDeleted => "workspace_deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event kind: '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// EventStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a persisted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting for `scheduled_at` and a poller.
    Pending,
    /// Claimed by a poller, sitting in a local queue.
    Dequeue,
    /// Handlers are executing.
    Running,
    Completed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Dequeue => "dequeue",
            EventStatus::Running => "running",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "dequeue" => Ok(EventStatus::Dequeue),
            "running" => Ok(EventStatus::Running),
            "completed" => Ok(EventStatus::Completed),
            "failed" => Ok(EventStatus::Failed),
            other => Err(format!("unknown event status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSubmissionEvent {
    pub submission_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelSubmissionEvent {
    pub submission_id: Uuid,
    /// When cancellation was first requested; bounds the wait for run creation.
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSubmissionEvent {
    pub submission_id: Uuid,
    #[serde(default)]
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSubmissionEvent {
    pub submission_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRunsEvent {
    pub submission_id: Uuid,
    pub workspace_id: String,
    pub submission_type: SubmissionType,
    #[serde(default)]
    pub data_model_id: Option<String>,
    #[serde(default)]
    pub data_model_row_ids: Vec<String>,
    pub inputs: Template,
    #[serde(default)]
    pub outputs: Template,
    pub run_config: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRunEvent {
    pub submission_id: Uuid,
    pub run_id: Uuid,
    pub run_config: RunConfig,
    #[serde(default)]
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRunEvent {
    pub submission_id: Uuid,
    pub run_id: Uuid,
    #[serde(default)]
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelRunEvent {
    pub submission_id: Uuid,
    pub run_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRunEvent {
    pub submission_id: Uuid,
    pub run_id: Uuid,
    #[serde(default)]
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDeletedEvent {
    pub workspace_id: String,
    pub workflow_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDeletedEvent {
    pub workspace_id: String,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A saga event: one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CreateSubmission(CreateSubmissionEvent),
    CancelSubmission(CancelSubmissionEvent),
    DeleteSubmission(DeleteSubmissionEvent),
    SyncSubmission(SyncSubmissionEvent),
    CreateRuns(CreateRunsEvent),
    SubmitRun(SubmitRunEvent),
    SyncRun(SyncRunEvent),
    CancelRun(CancelRunEvent),
    DeleteRun(DeleteRunEvent),
    WorkflowDeleted(WorkflowDeletedEvent),
    WorkspaceDeleted(WorkspaceDeletedEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::CreateSubmission(_) => EventKind::CreateSubmission,
            Event::CancelSubmission(_) => EventKind::CancelSubmission,
            Event::DeleteSubmission(_) => EventKind::DeleteSubmission,
            Event::SyncSubmission(_) => EventKind::SyncSubmission,
            Event::CreateRuns(_) => EventKind::CreateRuns,
            Event::SubmitRun(_) => EventKind::SubmitRun,
            Event::SyncRun(_) => EventKind::SyncRun,
            Event::CancelRun(_) => EventKind::CancelRun,
            Event::DeleteRun(_) => EventKind::DeleteRun,
            Event::WorkflowDeleted(_) => EventKind::WorkflowDeleted,
            Event::WorkspaceDeleted(_) => EventKind::WorkspaceDeleted,
        }
    }

    /// How long after publication the event becomes eligible for dispatch.
    pub fn delay(&self) -> Duration {
        let secs = match self {
            Event::CancelSubmission(e) => e.delay_secs,
            Event::DeleteSubmission(e) => e.delay_secs,
            Event::SubmitRun(e) => e.delay_secs,
            Event::SyncRun(e) => e.delay_secs,
            Event::DeleteRun(e) => e.delay_secs,
            _ => 0,
        };
        Duration::from_secs(secs)
    }

    /// The submission this event belongs to, when it is submission-scoped.
    pub fn submission_id(&self) -> Option<Uuid> {
        match self {
            Event::CreateSubmission(e) => Some(e.submission_id),
            Event::CancelSubmission(e) => Some(e.submission_id),
            Event::DeleteSubmission(e) => Some(e.submission_id),
            Event::SyncSubmission(e) => Some(e.submission_id),
            Event::CreateRuns(e) => Some(e.submission_id),
            Event::SubmitRun(e) => Some(e.submission_id),
            Event::SyncRun(e) => Some(e.submission_id),
            Event::CancelRun(e) => Some(e.submission_id),
            Event::DeleteRun(e) => Some(e.submission_id),
            Event::WorkflowDeleted(_) | Event::WorkspaceDeleted(_) => None,
        }
    }

    /// Encode the payload (without the tag) as JSON.
    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Event::CreateSubmission(e) => serde_json::to_value(e),
            Event::CancelSubmission(e) => serde_json::to_value(e),
            Event::DeleteSubmission(e) => serde_json::to_value(e),
            Event::SyncSubmission(e) => serde_json::to_value(e),
            Event::CreateRuns(e) => serde_json::to_value(e),
            Event::SubmitRun(e) => serde_json::to_value(e),
            Event::SyncRun(e) => serde_json::to_value(e),
            Event::CancelRun(e) => serde_json::to_value(e),
            Event::DeleteRun(e) => serde_json::to_value(e),
            Event::WorkflowDeleted(e) => serde_json::to_value(e),
            Event::WorkspaceDeleted(e) => serde_json::to_value(e),
        }
    }

    /// Decode a payload using its tag.
    pub fn decode(kind: EventKind, payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let p = payload.clone();
        Ok(match kind {
            EventKind::CreateSubmission => Event::CreateSubmission(serde_json::from_value(p)?),
            EventKind::CancelSubmission => Event::CancelSubmission(serde_json::from_value(p)?),
            EventKind::DeleteSubmission => Event::DeleteSubmission(serde_json::from_value(p)?),
            EventKind::SyncSubmission => Event::SyncSubmission(serde_json::from_value(p)?),
            EventKind::CreateRuns => Event::CreateRuns(serde_json::from_value(p)?),
            EventKind::SubmitRun => Event::SubmitRun(serde_json::from_value(p)?),
            EventKind::SyncRun => Event::SyncRun(serde_json::from_value(p)?),
            EventKind::CancelRun => Event::CancelRun(serde_json::from_value(p)?),
            EventKind::DeleteRun => Event::DeleteRun(serde_json::from_value(p)?),
            EventKind::WorkflowDeleted => Event::WorkflowDeleted(serde_json::from_value(p)?),
            EventKind::WorkspaceDeleted => Event::WorkspaceDeleted(serde_json::from_value(p)?),
        })
    }
}

// ---------------------------------------------------------------------------
// EventRecord
// ---------------------------------------------------------------------------

/// A persisted event with its dispatch metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl EventRecord {
    /// Build a fresh `pending` record scheduled at `now + event.delay()`.
    pub fn new(event: &Event, now: DateTime<Utc>) -> Result<Self, serde_json::Error> {
        let delay = chrono::Duration::from_std(event.delay()).unwrap_or(chrono::Duration::zero());
        Ok(Self {
            id: Uuid::now_v7(),
            kind: event.kind(),
            payload: event.to_payload()?,
            status: EventStatus::Pending,
            created_at: now,
            updated_at: now,
            scheduled_at: now + delay,
            retry_count: 0,
        })
    }

    pub fn decode(&self) -> Result<Event, serde_json::Error> {
        Event::decode(self.kind, &self.payload)
    }
}

/// Criteria for searching the event store.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Match any of these kinds (empty = all).
    pub kinds: Vec<EventKind>,
    /// Match any of these statuses (empty = all).
    pub statuses: Vec<EventStatus>,
    pub limit: Option<u32>,
}
