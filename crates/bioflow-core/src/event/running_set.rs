//! Set of event ids currently executing in this process.
//!
//! Shared by all workers of a bus. Membership is held by a [`RunningGuard`]
//! and released when the guard drops, including on panic or early return.

use std::sync::Arc;

use dashmap::DashSet;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct RunningSet {
    inner: Arc<DashSet<Uuid>>,
}

impl RunningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as running. Returns `None` if it already is.
    pub fn try_acquire(&self, id: Uuid) -> Option<RunningGuard> {
        if self.inner.insert(id) {
            Some(RunningGuard {
                set: Arc::clone(&self.inner),
                id,
            })
        } else {
            None
        }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.contains(id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for RunningSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningSet")
            .field("running", &self.inner.len())
            .finish()
    }
}

/// Proof of exclusive in-process execution of one event.
#[derive(Debug)]
pub struct RunningGuard {
    set: Arc<DashSet<Uuid>>,
    id: Uuid,
}

impl RunningGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}
