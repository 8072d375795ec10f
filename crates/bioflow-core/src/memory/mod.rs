//! In-memory implementations of every storage port.
//!
//! Backed by `DashMap`. Used by the test suites and by embedders that do not
//! need durability. Nothing here survives a restart.

mod data_model;
mod event;
mod run;
mod submission;
mod workflow;

pub use data_model::MemoryDataModelService;
pub use event::MemoryEventStore;
pub use run::{MemoryRunRepository, MemoryTaskRepository};
pub use submission::MemorySubmissionRepository;
pub use workflow::MemoryWorkflowRepository;

/// Case-insensitive substring match; `None` matches everything.
fn matches_search(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        Some(word) if !word.is_empty() => haystack.to_lowercase().contains(&word.to_lowercase()),
        _ => true,
    }
}
