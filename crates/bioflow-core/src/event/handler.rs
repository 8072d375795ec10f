//! Handler and publisher seams of the event bus.
//!
//! Both traits are object safe (boxed futures) so the bus can keep a
//! heterogeneous list of handlers per event kind, and handlers can hold the
//! bus as a plain `Arc<dyn EventPublisher>`.

use std::time::Duration;

use bioflow_types::error::{AppError, EngineError, RepositoryError, ResolveError};
use bioflow_types::event::Event;
use thiserror::Error;
use uuid::Uuid;

pub type BoxFuture<'a, T> = futures_util::future::BoxFuture<'a, T>;

/// Outcome of a handler invocation other than success.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// Not a failure: redeliver this same event after the given delay.
    #[error("redeliver after {0:?}")]
    Delayed(Duration),

    #[error(transparent)]
    App(#[from] AppError),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::Delayed(_) => true,
            HandlerError::App(err) => err.is_retryable(),
        }
    }
}

impl From<RepositoryError> for HandlerError {
    fn from(err: RepositoryError) -> Self {
        HandlerError::App(err.into())
    }
}

impl From<ResolveError> for HandlerError {
    fn from(err: ResolveError) -> Self {
        HandlerError::App(err.into())
    }
}

impl From<EngineError> for HandlerError {
    fn from(err: EngineError) -> Self {
        HandlerError::App(err.into())
    }
}

/// A subscriber for one or more event kinds.
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    fn handle<'a>(&'a self, event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>>;
}

/// Something that durably accepts events for later dispatch.
pub trait EventPublisher: Send + Sync {
    /// Persist `event` and return the id of its record.
    fn publish(&self, event: Event) -> BoxFuture<'_, Result<Uuid, AppError>>;
}

/// Error for a handler that was dispatched an event it does not subscribe to.
pub fn unexpected_event(handler: &str, event: &Event) -> HandlerError {
    HandlerError::App(AppError::Invalid(format!(
        "{handler} cannot handle '{}' events",
        event.kind()
    )))
}
