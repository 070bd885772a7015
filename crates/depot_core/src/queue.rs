//! Durable outbox of pending mutations
//!
//! The whole queue is one JSON array under [`QUEUE_KEY`]; every change is a
//! read-modify-write inside a store transaction.

use crate::store::{Store, Transaction};
use chrono::{DateTime, Utc};
use depot_common::{Collection, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const QUEUE_KEY: &str = "sync_queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// One pending change, replayed remotely by the sync manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    pub id: String,
    pub operation: Operation,
    pub collection: Collection,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
}

impl MutationRecord {
    pub fn new(operation: Operation, collection: Collection, payload: serde_json::Value) -> Self {
        let enqueued_at = Utc::now();
        Self {
            id: format!(
                "{}_{}_{}_{:016x}",
                collection,
                operation,
                enqueued_at.timestamp_millis(),
                rand::random::<u64>()
            ),
            operation,
            collection,
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    /// `payload.id` when the snapshot carries one
    pub fn entity_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(|v| v.as_str())
    }
}

/// Result of recording a failed remote application
#[derive(Debug, Clone, PartialEq)]
pub enum RetryState {
    /// Still queued with the new retry count
    Retrying(u32),
    /// Retry budget spent; the record was removed from the queue
    Exhausted(MutationRecord),
}

#[derive(Clone)]
pub struct SyncQueue {
    store: Store,
}

impl SyncQueue {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append a new record and return its id.
    pub fn enqueue(
        &self,
        operation: Operation,
        collection: Collection,
        payload: serde_json::Value,
    ) -> Result<String> {
        let record = self
            .store
            .transaction(|tx| Self::enqueue_in(tx, operation, collection, payload))?;
        Ok(record.id)
    }

    /// Stage an append inside a caller-owned transaction, so the entity
    /// write and the queue append commit together.
    pub fn enqueue_in(
        tx: &mut Transaction<'_>,
        operation: Operation,
        collection: Collection,
        payload: serde_json::Value,
    ) -> Result<MutationRecord> {
        let record = MutationRecord::new(operation, collection, payload);
        let mut queue: Vec<MutationRecord> = tx.get(QUEUE_KEY)?.unwrap_or_default();
        queue.push(record.clone());
        tx.put(QUEUE_KEY, &queue)?;

        tracing::debug!("Queued {} {} ({})", record.operation, record.collection, record.id);
        Ok(record)
    }

    /// Snapshot of the queue in FIFO order
    pub fn pending(&self) -> Result<Vec<MutationRecord>> {
        Ok(self.store.get(QUEUE_KEY)?.unwrap_or_default())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn pending_for(&self, collection: Collection) -> Result<usize> {
        Ok(self
            .pending()?
            .iter()
            .filter(|record| record.collection == collection)
            .count())
    }

    /// Returns false if no record had this id.
    pub fn remove(&self, id: &str) -> Result<bool> {
        self.store.update(QUEUE_KEY, |queue: &mut Vec<MutationRecord>| {
            let before = queue.len();
            queue.retain(|record| record.id != id);
            queue.len() != before
        })
    }

    /// Increment the retry count of `id`; once it reaches `max_retries` the
    /// record is removed in the same write. `None` if `id` is not queued.
    pub fn mark_failed(&self, id: &str, max_retries: u32) -> Result<Option<RetryState>> {
        self.store.update(QUEUE_KEY, |queue: &mut Vec<MutationRecord>| {
            let index = queue.iter().position(|record| record.id == id)?;
            queue[index].retry_count += 1;

            if queue[index].retry_count >= max_retries {
                Some(RetryState::Exhausted(queue.remove(index)))
            } else {
                Some(RetryState::Retrying(queue[index].retry_count))
            }
        })
    }

    /// Drop every pending record and return how many there were.
    pub fn clear(&self) -> Result<usize> {
        let removed = self
            .store
            .update(QUEUE_KEY, |queue: &mut Vec<MutationRecord>| {
                std::mem::take(queue).len()
            })?;
        tracing::warn!("Discarded {} pending mutations", removed);
        Ok(removed)
    }
}
