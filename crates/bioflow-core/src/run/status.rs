//! Mapping from engine states to run and task statuses.

use bioflow_types::engine::EngineRunState;
use bioflow_types::run::{RunStatus, TaskStatus};

/// Status a run moves to after the engine reports `state`.
///
/// A cancelling run only leaves `Cancelling` for a terminal engine state, and
/// may still end `Succeeded` if the engine finished before the cancel landed.
pub fn next_run_status(current: RunStatus, state: EngineRunState) -> RunStatus {
    if current == RunStatus::Cancelling {
        return match state {
            EngineRunState::Complete => RunStatus::Succeeded,
            EngineRunState::ExecutorError | EngineRunState::SystemError => RunStatus::Failed,
            EngineRunState::Canceled => RunStatus::Cancelled,
            _ => RunStatus::Cancelling,
        };
    }
    match state {
        EngineRunState::Complete => RunStatus::Succeeded,
        EngineRunState::ExecutorError | EngineRunState::SystemError | EngineRunState::Canceled => {
            RunStatus::Failed
        }
        _ => RunStatus::Running,
    }
}

/// Task status from its exit code, falling back to the state of its run.
pub fn task_status(exit_code: Option<i32>, run: RunStatus) -> TaskStatus {
    match exit_code {
        Some(0) => TaskStatus::Succeeded,
        Some(_) => TaskStatus::Failed,
        None => match run {
            RunStatus::Cancelled => TaskStatus::Cancelled,
            RunStatus::Failed => TaskStatus::Failed,
            RunStatus::Succeeded => TaskStatus::Succeeded,
            _ => TaskStatus::Running,
        },
    }
}
