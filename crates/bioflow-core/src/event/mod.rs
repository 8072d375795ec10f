//! Durable at-least-once event bus.
//!
//! - `handler`: the object-safe `EventHandler` / `EventPublisher` seams
//! - `running_set`: in-process "currently executing" set
//! - `bus`: the store-backed bus with its worker pool and poller

pub mod bus;
pub mod handler;
pub mod running_set;

pub use bus::{EventBus, ProcessOutcome, WeakPublisher};
pub use handler::{BoxFuture, EventHandler, EventPublisher, HandlerError};
pub use running_set::{RunningGuard, RunningSet};
