//! Event store trait definition.
//!
//! The store is the source of truth for the bus. Every status change goes
//! through a conditional update so that two workers (in one process or in
//! several) never both claim the same event.

use std::time::Duration;

use bioflow_types::error::RepositoryError;
use bioflow_types::event::{EventFilter, EventKind, EventRecord, EventStatus};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable storage for [`EventRecord`]s.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait EventStore: Send + Sync {
    /// Insert a new record.
    fn save(
        &self,
        record: &EventRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<EventRecord>, RepositoryError>> + Send;

    /// Claim up to `limit` events of the given kinds that are ready for dispatch.
    ///
    /// Eligible are `pending` events that are due, `dequeue` claims older than
    /// `dequeue_timeout` and `running` events older than `running_timeout`.
    /// Each is claimed with a conditional update that also refreshes
    /// `updated_at`; only the records whose claim succeeded are returned.
    fn list_and_lock_unfinished_events(
        &self,
        limit: u32,
        kinds: &[EventKind],
        dequeue_timeout: Duration,
        running_timeout: Duration,
    ) -> impl std::future::Future<Output = Result<Vec<EventRecord>, RepositoryError>> + Send;

    /// Compare-and-set the status. Returns `false` if the stored status was not `from`.
    fn update_status(
        &self,
        id: &Uuid,
        from: EventStatus,
        to: EventStatus,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record a failed attempt and move the event to `status`.
    fn update_retry_count(
        &self,
        id: &Uuid,
        retry_count: u32,
        status: EventStatus,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Put the event back to `pending`, due at `scheduled_at`, with `retry_count`.
    fn reschedule(
        &self,
        id: &Uuid,
        scheduled_at: DateTime<Utc>,
        retry_count: u32,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List records matching the filter, oldest first.
    fn search(
        &self,
        filter: &EventFilter,
    ) -> impl std::future::Future<Output = Result<Vec<EventRecord>, RepositoryError>> + Send;
}
