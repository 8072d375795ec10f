//! SQLite event store implementation.
//!
//! Every status change is a conditional `UPDATE ... WHERE status = ?`, so two
//! processes sharing the database never both claim the same event. Claims of
//! stale `dequeue`/`running` rows additionally match on the `updated_at` that
//! was read, which makes a reclaim race lose cleanly.

use std::time::Duration;

use bioflow_core::repository::event::EventStore;
use bioflow_types::error::RepositoryError;
use bioflow_types::event::{EventFilter, EventKind, EventRecord, EventStatus};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, parse_enum, parse_uuid, query_err, to_json};

const COLUMNS: &str = "id, kind, payload, status, created_at, updated_at, scheduled_at, retry_count";

/// SQLite-backed implementation of `EventStore`.
pub struct SqliteEventStore {
    pool: DatabasePool,
}

impl SqliteEventStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct EventRow {
    id: String,
    kind: String,
    payload: String,
    status: String,
    created_at: String,
    updated_at: String,
    scheduled_at: String,
    retry_count: i64,
}

impl EventRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            scheduled_at: row.try_get("scheduled_at")?,
            retry_count: row.try_get("retry_count")?,
        })
    }

    fn into_record(self) -> Result<EventRecord, RepositoryError> {
        Ok(EventRecord {
            id: parse_uuid(&self.id)?,
            kind: parse_enum("event kind", &self.kind)?,
            payload: from_json("payload", &self.payload)?,
            status: parse_enum("event status", &self.status)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            scheduled_at: parse_datetime(&self.scheduled_at)?,
            retry_count: u32::try_from(self.retry_count).unwrap_or(u32::MAX),
        })
    }
}

fn cutoff(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    now - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero())
}

// ---------------------------------------------------------------------------
// EventStore impl
// ---------------------------------------------------------------------------

impl EventStore for SqliteEventStore {
    async fn save(&self, record: &EventRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO events
               (id, kind, payload, status, created_at, updated_at, scheduled_at, retry_count)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.kind.as_str())
        .bind(to_json(&record.payload)?)
        .bind(record.status.as_str())
        .bind(format_datetime(&record.created_at))
        .bind(format_datetime(&record.updated_at))
        .bind(format_datetime(&record.scheduled_at))
        .bind(i64::from(record.retry_count))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("event {} already exists", record.id))
            }
            other => query_err(other),
        })?;
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<EventRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM events WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(EventRow::from_row(&row).map_err(query_err)?.into_record()?)),
            None => Ok(None),
        }
    }

    async fn list_and_lock_unfinished_events(
        &self,
        limit: u32,
        kinds: &[EventKind],
        dequeue_timeout: Duration,
        running_timeout: Duration,
    ) -> Result<Vec<EventRecord>, RepositoryError> {
        if kinds.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let now_text = format_datetime(&now);

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {COLUMNS} FROM events WHERE kind IN ("));
        let mut separated = qb.separated(", ");
        for kind in kinds {
            separated.push_bind(kind.as_str());
        }
        qb.push(") AND ((status = 'pending' AND scheduled_at <= ")
            .push_bind(now_text.clone())
            .push(") OR (status = 'dequeue' AND updated_at < ")
            .push_bind(format_datetime(&cutoff(now, dequeue_timeout)))
            .push(") OR (status = 'running' AND updated_at < ")
            .push_bind(format_datetime(&cutoff(now, running_timeout)))
            .push(")) ORDER BY created_at ASC, id ASC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = qb
            .build()
            .fetch_all(&self.pool.writer)
            .await
            .map_err(query_err)?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in &rows {
            let candidate = EventRow::from_row(row).map_err(query_err)?;
            let result = sqlx::query(
                r#"UPDATE events
                   SET status = CASE status WHEN 'pending' THEN 'dequeue' ELSE status END,
                       updated_at = ?
                   WHERE id = ? AND status = ? AND updated_at = ?"#,
            )
            .bind(&now_text)
            .bind(&candidate.id)
            .bind(&candidate.status)
            .bind(&candidate.updated_at)
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

            if result.rows_affected() == 1 {
                let mut record = candidate.into_record()?;
                if record.status == EventStatus::Pending {
                    record.status = EventStatus::Dequeue;
                }
                record.updated_at = parse_datetime(&now_text)?;
                claimed.push(record);
            }
        }
        Ok(claimed)
    }

    async fn update_status(&self, id: &Uuid, from: EventStatus, to: EventStatus) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE events SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .bind(from.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_retry_count(&self, id: &Uuid, retry_count: u32, status: EventStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE events SET retry_count = ?, status = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(retry_count))
            .bind(status.as_str())
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn reschedule(&self, id: &Uuid, scheduled_at: DateTime<Utc>, retry_count: u32) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE events SET status = 'pending', scheduled_at = ?, retry_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(format_datetime(&scheduled_at))
        .bind(i64::from(retry_count))
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn search(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, RepositoryError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {COLUMNS} FROM events WHERE 1 = 1"));
        if !filter.kinds.is_empty() {
            qb.push(" AND kind IN (");
            let mut separated = qb.separated(", ");
            for kind in &filter.kinds {
                separated.push_bind(kind.as_str());
            }
            qb.push(")");
        }
        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut separated = qb.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            qb.push(")");
        }
        qb.push(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool.reader).await.map_err(query_err)?;
        rows.iter()
            .map(|row| EventRow::from_row(row).map_err(query_err)?.into_record())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bioflow_types::event::{Event, SyncSubmissionEvent};

    use crate::sqlite::test_pool;

    fn record(delay_secs: i64) -> EventRecord {
        let event = Event::SyncSubmission(SyncSubmissionEvent {
            submission_id: Uuid::now_v7(),
        });
        let mut record = EventRecord::new(&event, Utc::now()).unwrap();
        record.scheduled_at += chrono::Duration::seconds(delay_secs);
        record
    }

    const KINDS: &[EventKind] = &[EventKind::SyncSubmission];
    const LONG: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let store = SqliteEventStore::new(test_pool().await);
        let rec = record(0);
        store.save(&rec).await.unwrap();

        let loaded = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.kind, EventKind::SyncSubmission);
        assert_eq!(loaded.status, EventStatus::Pending);
        assert_eq!(loaded.payload, rec.payload);
        assert!(matches!(store.save(&rec).await, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_claims_due_events_once() {
        let store = SqliteEventStore::new(test_pool().await);
        let due = record(0);
        let later = record(600);
        store.save(&due).await.unwrap();
        store.save(&later).await.unwrap();

        let claimed = store.list_and_lock_unfinished_events(10, KINDS, LONG, LONG).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, due.id);
        assert_eq!(claimed[0].status, EventStatus::Dequeue);

        let again = store.list_and_lock_unfinished_events(10, KINDS, LONG, LONG).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_stale_running_event_is_reclaimed() {
        let store = SqliteEventStore::new(test_pool().await);
        let rec = record(0);
        store.save(&rec).await.unwrap();
        store.list_and_lock_unfinished_events(10, KINDS, LONG, LONG).await.unwrap();
        assert!(store.update_status(&rec.id, EventStatus::Dequeue, EventStatus::Running).await.unwrap());

        let fresh = store.list_and_lock_unfinished_events(10, KINDS, LONG, LONG).await.unwrap();
        assert!(fresh.is_empty());

        tokio::time::sleep(Duration::from_millis(5)).await;
        let stale = store
            .list_and_lock_unfinished_events(10, KINDS, LONG, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].status, EventStatus::Running);
    }

    #[tokio::test]
    async fn test_update_status_is_conditional() {
        let store = SqliteEventStore::new(test_pool().await);
        let rec = record(0);
        store.save(&rec).await.unwrap();

        assert!(store.update_status(&rec.id, EventStatus::Pending, EventStatus::Running).await.unwrap());
        assert!(!store.update_status(&rec.id, EventStatus::Pending, EventStatus::Running).await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_and_reschedule() {
        let store = SqliteEventStore::new(test_pool().await);
        let rec = record(0);
        store.save(&rec).await.unwrap();

        store.update_retry_count(&rec.id, 2, EventStatus::Pending).await.unwrap();
        let at = Utc::now() + chrono::Duration::seconds(30);
        let loaded = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.retry_count, 2);

        store.reschedule(&rec.id, at, 0).await.unwrap();

        let loaded = store.get(&rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.retry_count, 0);
        assert_eq!(loaded.status, EventStatus::Pending);
        assert!(loaded.scheduled_at > Utc::now());
        assert!(matches!(
            store.reschedule(&Uuid::now_v7(), at, 0).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_search_filters_by_status() {
        let store = SqliteEventStore::new(test_pool().await);
        let first = record(0);
        let second = record(0);
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        store.update_status(&second.id, EventStatus::Pending, EventStatus::Failed).await.unwrap();

        let failed = store
            .search(&EventFilter {
                statuses: vec![EventStatus::Failed],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, second.id);

        let all = store.search(&EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
