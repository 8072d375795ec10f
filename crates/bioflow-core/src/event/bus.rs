//! Store-backed event bus with a fixed worker pool.
//!
//! Events are persisted before anything else happens to them. A poller claims
//! due events from the store and feeds their ids into one shared, rate-limited
//! in-process queue. Workers drain the queue and run every subscribed handler
//! for the event. The store's conditional status updates and the
//! [`RunningSet`] together make sure an event executes at most once at a time.

use std::num::NonZeroU32;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bioflow_types::config::EventBusConfig;
use bioflow_types::error::AppError;
use bioflow_types::event::{Event, EventKind, EventRecord, EventStatus};
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use futures_util::future::join_all;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::handler::{BoxFuture, EventHandler, EventPublisher, HandlerError};
use super::running_set::RunningSet;
use crate::repository::event::EventStore;

/// Base delay between attempts to persist a published event.
const PUBLISH_BACKOFF: Duration = Duration::from_millis(100);

/// What `process_event` did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// All handlers succeeded.
    Completed,
    /// A handler failed; the event is pending again.
    Retrying,
    /// The event is permanently failed.
    Failed,
    /// A handler asked for redelivery after a delay.
    Delayed,
    /// The event is not due yet and was queued for later.
    Rescheduled,
    /// Nothing to do: missing, finished, or executing elsewhere.
    Skipped,
}

/// Ids waiting for a worker, plus the timers that will push more.
#[derive(Clone)]
struct LocalQueue {
    tx: mpsc::UnboundedSender<Uuid>,
    depth: Arc<AtomicUsize>,
    timers: Arc<DashSet<Uuid>>,
}

impl LocalQueue {
    fn push(&self, id: Uuid) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(id).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Push `id` once `delay` has elapsed. At most one timer per id.
    fn push_after(&self, id: Uuid, delay: Duration, cancel: CancellationToken) {
        if !self.timers.insert(id) {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    queue.timers.remove(&id);
                }
                _ = tokio::time::sleep(delay) => {
                    queue.timers.remove(&id);
                    queue.push(id);
                }
            }
        });
    }

    fn is_empty(&self) -> bool {
        self.depth.load(Ordering::SeqCst) == 0
    }
}

/// Durable at-least-once event bus over an [`EventStore`].
pub struct EventBus<E> {
    store: Arc<E>,
    config: EventBusConfig,
    handlers: DashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
    running: RunningSet,
    queue: LocalQueue,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Uuid>>,
    limiter: DefaultDirectRateLimiter,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl<E: EventStore + 'static> EventBus<E> {
    pub fn new(store: Arc<E>, config: EventBusConfig, running: RunningSet) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rate = NonZeroU32::new(config.rate_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(rate);
        let limiter = RateLimiter::direct(Quota::per_second(rate).allow_burst(burst));

        Self {
            store,
            config,
            handlers: DashMap::new(),
            running,
            queue: LocalQueue {
                tx,
                depth: Arc::new(AtomicUsize::new(0)),
                timers: Arc::new(DashSet::new()),
            },
            queue_rx: Mutex::new(rx),
            limiter,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<E> {
        &self.store
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn running(&self) -> &RunningSet {
        &self.running
    }

    /// Register `handler` for `kind`. Every handler of a kind sees every event of it.
    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        debug!(%kind, handler = handler.name(), "handler subscribed");
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn has_handlers(&self, kind: EventKind) -> bool {
        self.handlers.get(&kind).is_some_and(|entry| !entry.is_empty())
    }

    fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .get(&kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn subscribed_kinds(&self) -> Vec<EventKind> {
        self.handlers.iter().map(|entry| *entry.key()).collect()
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Persist a new pending event, retrying the save with exponential backoff.
    pub async fn publish_event(&self, event: Event) -> Result<Uuid, AppError> {
        let record = EventRecord::new(&event, Utc::now())
            .map_err(|e| AppError::Invalid(format!("cannot encode event payload: {e}")))?;

        let attempts = self.config.publish_retries.max(1);
        let mut backoff = PUBLISH_BACKOFF;
        for attempt in 1..=attempts {
            match self.store.save(&record).await {
                Ok(()) => break,
                Err(err) if attempt < attempts => {
                    warn!(kind = %record.kind, attempt, error = %err, "failed to save event, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => {
                    error!(kind = %record.kind, attempt, error = %err, "failed to save event");
                    return Err(err.into());
                }
            }
        }

        debug!(
            event_id = %record.id,
            kind = %record.kind,
            submission_id = ?event.submission_id(),
            "event published"
        );

        if event.delay().is_zero() && self.handlers.contains_key(&record.kind) {
            self.queue.push(record.id);
        }
        Ok(record.id)
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    /// Run every subscribed handler for one event and record the outcome.
    pub async fn process_event(&self, id: Uuid) -> Result<ProcessOutcome, AppError> {
        let Some(record) = self.store.get(&id).await? else {
            debug!(event_id = %id, "event not found, skipping");
            return Ok(ProcessOutcome::Skipped);
        };
        if record.status.is_terminal() {
            debug!(event_id = %id, status = %record.status, "event already finished");
            return Ok(ProcessOutcome::Skipped);
        }

        let now = Utc::now();
        if record.scheduled_at > now {
            let remaining = (record.scheduled_at - now).to_std().unwrap_or(Duration::ZERO);
            self.queue.push_after(id, remaining, self.cancel.clone());
            return Ok(ProcessOutcome::Rescheduled);
        }

        if record.retry_count >= self.config.max_retries {
            self.store
                .update_status(&id, record.status, EventStatus::Failed)
                .await?;
            error!(event_id = %id, kind = %record.kind, retries = record.retry_count, "event exhausted its retries");
            return Ok(ProcessOutcome::Failed);
        }

        if record.status == EventStatus::Running && !self.running.contains(&id) {
            if self
                .store
                .update_status(&id, EventStatus::Running, EventStatus::Failed)
                .await?
            {
                warn!(event_id = %id, kind = %record.kind, "event abandoned while running, marked failed");
            }
            return Ok(ProcessOutcome::Failed);
        }

        let Some(_guard) = self.running.try_acquire(id) else {
            debug!(event_id = %id, "event already running in this process");
            return Ok(ProcessOutcome::Skipped);
        };
        if record.status == EventStatus::Running
            || !self
                .store
                .update_status(&id, record.status, EventStatus::Running)
                .await?
        {
            debug!(event_id = %id, "lost the claim on event");
            return Ok(ProcessOutcome::Skipped);
        }

        let event = match record.decode() {
            Ok(event) => event,
            Err(err) => {
                error!(event_id = %id, kind = %record.kind, error = %err, "undecodable event payload");
                self.store
                    .update_status(&id, EventStatus::Running, EventStatus::Failed)
                    .await?;
                return Ok(ProcessOutcome::Failed);
            }
        };

        let handlers = self.handlers_for(record.kind);
        if handlers.is_empty() {
            warn!(event_id = %id, kind = %record.kind, "no handler subscribed");
        }
        let results = join_all(handlers.iter().map(|h| h.handle(&event))).await;

        let mut delay: Option<Duration> = None;
        let mut failure: Option<HandlerError> = None;
        for (handler, result) in handlers.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(HandlerError::Delayed(d)) => {
                    delay = Some(delay.map_or(d, |current| current.max(d)));
                }
                Err(err) => {
                    warn!(event_id = %id, kind = %record.kind, handler = handler.name(), error = %err, "handler failed");
                    let replace = match &failure {
                        None => true,
                        Some(existing) => existing.is_retryable() && !err.is_retryable(),
                    };
                    if replace {
                        failure = Some(err);
                    }
                }
            }
        }

        if let Some(err) = failure {
            let attempts = record.retry_count + 1;
            if !err.is_retryable() || attempts >= self.config.max_retries {
                self.store
                    .update_retry_count(&id, attempts, EventStatus::Failed)
                    .await?;
                error!(event_id = %id, kind = %record.kind, attempts, error = %err, "event failed");
                return Ok(ProcessOutcome::Failed);
            }
            self.store
                .update_retry_count(&id, attempts, EventStatus::Pending)
                .await?;
            warn!(event_id = %id, kind = %record.kind, attempts, "event will be retried");
            return Ok(ProcessOutcome::Retrying);
        }

        // A delayed redelivery is progress; the retry budget covers consecutive failures only.
        if let Some(d) = delay {
            let at = Utc::now() + chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero());
            self.store.reschedule(&id, at, 0).await?;
            self.queue.push_after(id, d, self.cancel.clone());
            debug!(event_id = %id, kind = %record.kind, delay_ms = d.as_millis() as u64, "event redelivery scheduled");
            return Ok(ProcessOutcome::Delayed);
        }

        self.store
            .update_status(&id, EventStatus::Running, EventStatus::Completed)
            .await?;
        debug!(event_id = %id, kind = %record.kind, "event completed");
        Ok(ProcessOutcome::Completed)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawn `config.workers` workers and the store poller.
    pub async fn start(self: &Arc<Self>) {
        let workers = self.config.workers.max(1);
        let mut tasks = self.tasks.lock().await;
        for worker in 0..workers {
            tasks.spawn(Arc::clone(self).worker_loop(worker));
        }
        tasks.spawn(Arc::clone(self).poll_loop());
        info!(workers, "event bus started");
    }

    /// Stop all workers and the poller, waiting for in-flight events to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                warn!(error = %err, "event bus task ended abnormally");
            }
        }
        info!("event bus stopped");
    }

    async fn worker_loop(self: Arc<Self>, worker: usize) {
        loop {
            let next = {
                let mut rx = self.queue_rx.lock().await;
                tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    id = rx.recv() => id,
                }
            };
            let Some(id) = next else { break };
            self.queue.depth.fetch_sub(1, Ordering::SeqCst);

            self.limiter.until_ready().await;
            match self.process_event(id).await {
                Ok(outcome) => debug!(worker, event_id = %id, ?outcome, "event processed"),
                Err(err) => error!(worker, event_id = %id, error = %err, "event processing error"),
            }
        }
        debug!(worker, "event worker stopped");
    }

    async fn poll_loop(self: Arc<Self>) {
        let period = self.config.sync_period().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if !self.queue.is_empty() {
                continue;
            }
            let kinds = self.subscribed_kinds();
            if kinds.is_empty() {
                continue;
            }

            match self
                .store
                .list_and_lock_unfinished_events(
                    self.config.batch_size,
                    &kinds,
                    self.config.dequeue_timeout(),
                    self.config.running_timeout(),
                )
                .await
            {
                Ok(records) => {
                    if !records.is_empty() {
                        debug!(count = records.len(), "claimed due events");
                    }
                    for record in records {
                        self.queue.push(record.id);
                    }
                }
                Err(err) => warn!(error = %err, "failed to poll event store"),
            }
        }
        debug!("event poller stopped");
    }
}

impl<E: EventStore + 'static> EventPublisher for EventBus<E> {
    fn publish(&self, event: Event) -> BoxFuture<'_, Result<Uuid, AppError>> {
        Box::pin(self.publish_event(event))
    }
}

/// Publisher for handlers subscribed to the bus they publish on.
///
/// Holds the bus weakly so the bus and its handlers do not keep each other alive.
pub struct WeakPublisher<E> {
    bus: Weak<EventBus<E>>,
}

impl<E> WeakPublisher<E> {
    pub fn new(bus: &Arc<EventBus<E>>) -> Self {
        Self {
            bus: Arc::downgrade(bus),
        }
    }
}

impl<E: EventStore + 'static> EventPublisher for WeakPublisher<E> {
    fn publish(&self, event: Event) -> BoxFuture<'_, Result<Uuid, AppError>> {
        let bus = self.bus.upgrade();
        Box::pin(async move {
            match bus {
                Some(bus) => bus.publish_event(event).await,
                None => Err(AppError::Internal(format!(
                    "event bus dropped, cannot publish '{}'",
                    event.kind()
                ))),
            }
        })
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("kinds", &self.handlers.len())
            .field("running", &self.running)
            .field("queued", &self.queue.depth.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use bioflow_types::event::{EventFilter, SyncSubmissionEvent};
    use tokio::sync::Notify;

    use crate::memory::MemoryEventStore;

    struct CountingHandler {
        calls: AtomicU32,
        result: fn() -> Result<(), HandlerError>,
    }

    impl CountingHandler {
        fn new(result: fn() -> Result<(), HandlerError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                result,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EventHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn handle<'a>(&'a self, _event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = (self.result)();
            Box::pin(async move { result })
        }
    }

    /// Fails on odd calls and asks for an immediate redelivery on even ones.
    #[derive(Default)]
    struct FlakyPoller {
        calls: AtomicU32,
    }

    impl EventHandler for FlakyPoller {
        fn name(&self) -> &'static str {
            "flaky_poller"
        }

        fn handle<'a>(&'a self, _event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if call % 2 == 0 {
                Err(AppError::Internal("engine unavailable".into()).into())
            } else {
                Err(HandlerError::Delayed(Duration::ZERO))
            };
            Box::pin(async move { result })
        }
    }

    /// Blocks inside the handler until released.
    struct GateHandler {
        entered: AtomicU32,
        release: Notify,
    }

    impl EventHandler for GateHandler {
        fn name(&self) -> &'static str {
            "gate"
        }

        fn handle<'a>(&'a self, _event: &'a Event) -> BoxFuture<'a, Result<(), HandlerError>> {
            Box::pin(async move {
                self.entered.fetch_add(1, Ordering::SeqCst);
                self.release.notified().await;
                Ok(())
            })
        }
    }

    fn config() -> EventBusConfig {
        EventBusConfig {
            max_retries: 3,
            sync_period_ms: 10,
            ..Default::default()
        }
    }

    fn bus() -> Arc<EventBus<MemoryEventStore>> {
        Arc::new(EventBus::new(
            Arc::new(MemoryEventStore::new()),
            config(),
            RunningSet::new(),
        ))
    }

    fn sync_event() -> Event {
        Event::SyncSubmission(SyncSubmissionEvent {
            submission_id: Uuid::now_v7(),
        })
    }

    async fn status_of(bus: &EventBus<MemoryEventStore>, id: Uuid) -> EventRecord {
        bus.store().get(&id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn publish_persists_pending_record() {
        let bus = bus();
        let id = bus.publish_event(sync_event()).await.unwrap();

        let record = status_of(&bus, id).await;
        assert_eq!(record.status, EventStatus::Pending);
        assert_eq!(record.kind, EventKind::SyncSubmission);
        assert_eq!(record.retry_count, 0);
    }

    #[tokio::test]
    async fn every_subscribed_handler_runs_once() {
        let bus = bus();
        let first = CountingHandler::new(|| Ok(()));
        let second = CountingHandler::new(|| Ok(()));
        bus.subscribe(EventKind::SyncSubmission, first.clone());
        bus.subscribe(EventKind::SyncSubmission, second.clone());

        let id = bus.publish_event(sync_event()).await.unwrap();
        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Completed);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        assert_eq!(status_of(&bus, id).await.status, EventStatus::Completed);

        // Redelivery of a completed event is a no-op.
        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Skipped);
        assert_eq!(first.calls(), 1);
    }

    #[tokio::test]
    async fn failing_handler_is_retried_until_exhausted() {
        let bus = bus();
        let handler = CountingHandler::new(|| Err(AppError::Internal("boom".into()).into()));
        bus.subscribe(EventKind::SyncSubmission, handler.clone());
        let id = bus.publish_event(sync_event()).await.unwrap();

        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Retrying);
        assert_eq!(status_of(&bus, id).await.retry_count, 1);
        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Retrying);
        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Failed);

        let record = status_of(&bus, id).await;
        assert_eq!(record.status, EventStatus::Failed);
        assert_eq!(record.retry_count, 3);
        assert_eq!(handler.calls(), 3);

        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Skipped);
        assert_eq!(handler.calls(), 3);
    }

    #[tokio::test]
    async fn invalid_error_fails_without_retry() {
        let bus = bus();
        let handler = CountingHandler::new(|| Err(AppError::Invalid("bad input".into()).into()));
        bus.subscribe(EventKind::SyncSubmission, handler.clone());
        let id = bus.publish_event(sync_event()).await.unwrap();

        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Failed);
        assert_eq!(status_of(&bus, id).await.status, EventStatus::Failed);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn delayed_handler_reschedules_same_event() {
        let bus = bus();
        let handler = CountingHandler::new(|| Err(HandlerError::Delayed(Duration::from_secs(30))));
        bus.subscribe(EventKind::SyncSubmission, handler.clone());
        let id = bus.publish_event(sync_event()).await.unwrap();

        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Delayed);
        let record = status_of(&bus, id).await;
        assert_eq!(record.status, EventStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert!(record.scheduled_at > Utc::now() + chrono::Duration::seconds(20));

        // Not due yet.
        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Rescheduled);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn delayed_redelivery_resets_retry_budget() {
        let bus = bus();
        let handler = Arc::new(FlakyPoller::default());
        bus.subscribe(EventKind::SyncSubmission, handler.clone());
        let id = bus.publish_event(sync_event()).await.unwrap();

        // More scattered failures than max_retries, none of them back to back.
        for _ in 0..5 {
            assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Retrying);
            assert_eq!(status_of(&bus, id).await.retry_count, 1);
            assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Delayed);
            assert_eq!(status_of(&bus, id).await.retry_count, 0);
        }

        let record = status_of(&bus, id).await;
        assert_eq!(record.status, EventStatus::Pending);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn concurrent_delivery_executes_once() {
        let bus = bus();
        let gate = Arc::new(GateHandler {
            entered: AtomicU32::new(0),
            release: Notify::new(),
        });
        bus.subscribe(EventKind::SyncSubmission, gate.clone());
        let id = bus.publish_event(sync_event()).await.unwrap();

        let first = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.process_event(id).await })
        };
        while gate.entered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Skipped);
        gate.release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), ProcessOutcome::Completed);
        assert_eq!(gate.entered.load(Ordering::SeqCst), 1);
        assert!(bus.running().is_empty());
    }

    #[tokio::test]
    async fn running_event_without_local_owner_is_failed() {
        let bus = bus();
        let handler = CountingHandler::new(|| Ok(()));
        bus.subscribe(EventKind::SyncSubmission, handler.clone());
        let id = bus.publish_event(sync_event()).await.unwrap();
        bus.store()
            .update_status(&id, EventStatus::Pending, EventStatus::Running)
            .await
            .unwrap();

        assert_eq!(bus.process_event(id).await.unwrap(), ProcessOutcome::Failed);
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn started_bus_drains_published_and_stored_events() {
        let bus = bus();
        let handler = CountingHandler::new(|| Ok(()));
        bus.subscribe(EventKind::SyncSubmission, handler.clone());

        // Saved behind the bus's back: only the poller can find it.
        let stored = EventRecord::new(&sync_event(), Utc::now()).unwrap();
        bus.store().save(&stored).await.unwrap();

        bus.start().await;
        let published = bus.publish_event(sync_event()).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handler.calls() < 2 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bus.shutdown().await;

        assert_eq!(handler.calls(), 2);
        assert_eq!(status_of(&bus, stored.id).await.status, EventStatus::Completed);
        assert_eq!(status_of(&bus, published).await.status, EventStatus::Completed);

        let failed = bus
            .store()
            .search(&EventFilter {
                statuses: vec![EventStatus::Failed],
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(failed.is_empty());
    }
}
