//! Wiring of the submission and run sagas onto an [`EventBus`].

use std::sync::Arc;

use bioflow_types::event::EventKind;

use crate::data_model::DataModelService;
use crate::engine::EngineClient;
use crate::event::{EventBus, EventHandler, EventPublisher, WeakPublisher};
use crate::repository::event::EventStore;
use crate::repository::run::RunRepository;
use crate::repository::submission::SubmissionRepository;
use crate::repository::task::TaskRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::run::{
    CancelRunHandler, CreateRunsHandler, DeleteRunHandler, SubmitRunHandler, SyncRunHandler,
};
use crate::submission::{
    CancelSubmissionHandler, CascadeDeleteHandler, CreateSubmissionHandler, DeleteSubmissionHandler,
    SyncSubmissionHandler,
};

/// Collaborators shared by every saga handler.
pub struct SagaDeps<S, R, T, W, D, C> {
    pub submissions: Arc<S>,
    pub runs: Arc<R>,
    pub tasks: Arc<T>,
    pub workflows: Arc<W>,
    pub data_model: Arc<D>,
    pub engine: Arc<C>,
}

impl<S, R, T, W, D, C> Clone for SagaDeps<S, R, T, W, D, C> {
    fn clone(&self) -> Self {
        Self {
            submissions: self.submissions.clone(),
            runs: self.runs.clone(),
            tasks: self.tasks.clone(),
            workflows: self.workflows.clone(),
            data_model: self.data_model.clone(),
            engine: self.engine.clone(),
        }
    }
}

/// Subscribe one handler per event kind. Handlers publish follow-up events
/// back onto the same bus through a [`WeakPublisher`].
pub fn register_handlers<E, S, R, T, W, D, C>(bus: &Arc<EventBus<E>>, deps: &SagaDeps<S, R, T, W, D, C>)
where
    E: EventStore + 'static,
    S: SubmissionRepository + 'static,
    R: RunRepository + 'static,
    T: TaskRepository + 'static,
    W: WorkflowRepository + 'static,
    D: DataModelService + 'static,
    C: EngineClient + 'static,
{
    let publisher: Arc<dyn EventPublisher> = Arc::new(WeakPublisher::new(bus));

    let cascade: Arc<dyn EventHandler> =
        Arc::new(CascadeDeleteHandler::new(deps.submissions.clone(), publisher.clone()));

    let handlers: Vec<(EventKind, Arc<dyn EventHandler>)> = vec![
        (
            EventKind::CreateSubmission,
            Arc::new(CreateSubmissionHandler::new(
                deps.submissions.clone(),
                deps.workflows.clone(),
                publisher.clone(),
            )),
        ),
        (
            EventKind::CancelSubmission,
            Arc::new(CancelSubmissionHandler::new(
                deps.submissions.clone(),
                deps.runs.clone(),
                publisher.clone(),
            )),
        ),
        (
            EventKind::DeleteSubmission,
            Arc::new(DeleteSubmissionHandler::new(
                deps.submissions.clone(),
                deps.runs.clone(),
                publisher.clone(),
            )),
        ),
        (
            EventKind::SyncSubmission,
            Arc::new(SyncSubmissionHandler::new(
                deps.submissions.clone(),
                deps.runs.clone(),
                deps.data_model.clone(),
            )),
        ),
        (
            EventKind::CreateRuns,
            Arc::new(CreateRunsHandler::new(
                deps.submissions.clone(),
                deps.runs.clone(),
                deps.data_model.clone(),
                publisher.clone(),
            )),
        ),
        (
            EventKind::SubmitRun,
            Arc::new(SubmitRunHandler::new(deps.runs.clone(), deps.engine.clone(), publisher.clone())),
        ),
        (
            EventKind::SyncRun,
            Arc::new(SyncRunHandler::new(
                deps.runs.clone(),
                deps.tasks.clone(),
                deps.engine.clone(),
                publisher.clone(),
            )),
        ),
        (
            EventKind::CancelRun,
            Arc::new(CancelRunHandler::new(deps.runs.clone(), deps.engine.clone(), publisher.clone())),
        ),
        (
            EventKind::DeleteRun,
            Arc::new(DeleteRunHandler::new(deps.runs.clone(), deps.tasks.clone(), publisher.clone())),
        ),
        (EventKind::WorkflowDeleted, cascade.clone()),
        (EventKind::WorkspaceDeleted, cascade),
    ];

    for (kind, handler) in handlers {
        bus.subscribe(kind, handler);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bioflow_types::event::{Event, EventKind, SyncSubmissionEvent};
    use uuid::Uuid;

    use crate::event::{EventPublisher, WeakPublisher};
    use crate::test_support::Harness;

    #[tokio::test]
    async fn every_kind_has_a_handler() {
        let h = Harness::new().await;
        for kind in EventKind::ALL {
            assert!(h.bus.has_handlers(kind), "no handler for {kind}");
        }
    }

    #[tokio::test]
    async fn handlers_do_not_keep_the_bus_alive() {
        let h = Harness::new().await;
        assert_eq!(Arc::strong_count(&h.bus), 1);

        let publisher = WeakPublisher::new(&h.bus);
        let event = || {
            Event::SyncSubmission(SyncSubmissionEvent {
                submission_id: Uuid::now_v7(),
            })
        };
        assert!(publisher.publish(event()).await.is_ok());

        let Harness { bus, .. } = h;
        drop(bus);
        assert!(publisher.publish(event()).await.is_err());
    }
}
