//! Commands and queries exposed to the outer shell.
//!
//! Services validate, touch at most one aggregate, and hand everything else
//! to the saga by publishing an event.

pub mod catalog;
pub mod run;
pub mod submission;

pub use catalog::{CatalogService, ImportTableCommand, RegisterWorkflowCommand};
pub use run::{CancelRunCommand, ListRunsQuery, ListTasksQuery, RunService};
pub use submission::{
    CancelSubmissionCommand, CreateSubmissionCommand, DeleteSubmissionCommand, ListSubmissionsQuery,
    SubmissionService, SubmissionSummary,
};
