//! Submission saga handlers.
//!
//! Each handler reacts to one or two event kinds, reads the current state of
//! the submission and emits follow-up events. All of them are idempotent and
//! treat a missing submission as a no-op, because every event may be
//! delivered more than once.

mod cancel;
mod cascade;
mod create;
mod delete;
mod sync;

pub use cancel::{CANCEL_GRACE_PERIOD, CancelSubmissionHandler};
pub use cascade::CascadeDeleteHandler;
pub use create::CreateSubmissionHandler;
pub use delete::DeleteSubmissionHandler;
pub use sync::{SyncSubmissionHandler, aggregate_status};
