//! Run and task saga handlers.

mod cancel;
mod create;
mod delete;
mod status;
mod submit;
mod sync;

pub use cancel::CancelRunHandler;
pub use create::CreateRunsHandler;
pub use delete::DeleteRunHandler;
pub use status::{next_run_status, task_status};
pub use submit::SubmitRunHandler;
pub use sync::{POLL_JITTER_MS, SyncRunHandler};
