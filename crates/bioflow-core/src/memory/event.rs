use std::time::Duration;

use bioflow_types::error::RepositoryError;
use bioflow_types::event::{EventFilter, EventKind, EventRecord, EventStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::repository::event::EventStore;

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    records: DashMap<Uuid, EventRecord>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(&self, mut records: Vec<EventRecord>) -> Vec<EventRecord> {
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }
}

fn is_claimable(
    record: &EventRecord,
    now: DateTime<Utc>,
    dequeue_cutoff: DateTime<Utc>,
    running_cutoff: DateTime<Utc>,
) -> bool {
    match record.status {
        EventStatus::Pending => record.scheduled_at <= now,
        EventStatus::Dequeue => record.updated_at < dequeue_cutoff,
        EventStatus::Running => record.updated_at < running_cutoff,
        EventStatus::Completed | EventStatus::Failed => false,
    }
}

fn cutoff(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    now - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero())
}

impl EventStore for MemoryEventStore {
    async fn save(&self, record: &EventRecord) -> Result<(), RepositoryError> {
        if self.records.contains_key(&record.id) {
            return Err(RepositoryError::Conflict(format!("event {} already exists", record.id)));
        }
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<EventRecord>, RepositoryError> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn list_and_lock_unfinished_events(
        &self,
        limit: u32,
        kinds: &[EventKind],
        dequeue_timeout: Duration,
        running_timeout: Duration,
    ) -> Result<Vec<EventRecord>, RepositoryError> {
        let now = Utc::now();
        let dequeue_cutoff = cutoff(now, dequeue_timeout);
        let running_cutoff = cutoff(now, running_timeout);

        let candidates: Vec<EventRecord> = self
            .records
            .iter()
            .filter(|r| kinds.contains(&r.kind))
            .filter(|r| is_claimable(r, now, dequeue_cutoff, running_cutoff))
            .map(|r| r.value().clone())
            .collect();

        let mut claimed = Vec::new();
        for candidate in self.sorted(candidates) {
            if claimed.len() >= limit as usize {
                break;
            }
            // Re-check under the entry lock; another claimer may have won.
            if let Some(mut entry) = self.records.get_mut(&candidate.id) {
                if is_claimable(&entry, now, dequeue_cutoff, running_cutoff) {
                    if entry.status == EventStatus::Pending {
                        entry.status = EventStatus::Dequeue;
                    }
                    entry.updated_at = now;
                    claimed.push(entry.clone());
                }
            }
        }
        Ok(claimed)
    }

    async fn update_status(
        &self,
        id: &Uuid,
        from: EventStatus,
        to: EventStatus,
    ) -> Result<bool, RepositoryError> {
        match self.records.get_mut(id) {
            Some(mut entry) if entry.status == from => {
                entry.status = to;
                entry.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_retry_count(
        &self,
        id: &Uuid,
        retry_count: u32,
        status: EventStatus,
    ) -> Result<(), RepositoryError> {
        let mut entry = self.records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        entry.retry_count = retry_count;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn reschedule(
        &self,
        id: &Uuid,
        scheduled_at: DateTime<Utc>,
        retry_count: u32,
    ) -> Result<(), RepositoryError> {
        let mut entry = self.records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        entry.status = EventStatus::Pending;
        entry.scheduled_at = scheduled_at;
        entry.retry_count = retry_count;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn search(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, RepositoryError> {
        let matching: Vec<EventRecord> = self
            .records
            .iter()
            .filter(|r| filter.kinds.is_empty() || filter.kinds.contains(&r.kind))
            .filter(|r| filter.statuses.is_empty() || filter.statuses.contains(&r.status))
            .map(|r| r.value().clone())
            .collect();
        let mut sorted = self.sorted(matching);
        if let Some(limit) = filter.limit {
            sorted.truncate(limit as usize);
        }
        Ok(sorted)
    }
}
