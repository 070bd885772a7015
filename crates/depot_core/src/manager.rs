//! Drains the outbox against the remote backend
//!
//! A drain walks a snapshot of the queue in FIFO order, one record at a
//! time. Successful records are removed; failed ones have their retry count
//! bumped and are dropped once the budget is spent. Records the backend can
//! never accept (validation errors) are dropped on the first failure. Only
//! one drain runs at a
//! time; overlapping requests are skipped, not queued.

use crate::queue::{MutationRecord, Operation, RetryState, SyncQueue};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_common::{Collection, ListenerRegistry, Result, Topic};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Key of the RFC 3339 timestamp of the last completed drain
pub const LAST_SYNC_KEY: &str = "last_sync";

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Applies one queued mutation on the backend
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    async fn apply(&self, record: &MutationRecord) -> Result<()>;
}

/// Counters of one drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub succeeded: usize,
    /// Every failed application in this cycle, dropped or not
    pub failed: usize,
    pub total: usize,
    /// Records removed because their retry budget ran out
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InFlight,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    Skipped(SkipReason),
}

impl DrainOutcome {
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            DrainOutcome::Completed(report) => Some(report),
            DrainOutcome::Skipped(_) => None,
        }
    }
}

/// Notifications from the sync core
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    ConnectivityChanged {
        online: bool,
    },
    Enqueued {
        id: String,
        collection: Collection,
        operation: Operation,
    },
    DrainCompleted(DrainReport),
    /// A record exhausted its retries and was removed from the queue
    PermanentFailure(MutationRecord),
    PendingChanged {
        pending: usize,
    },
}

impl Topic for SyncEvent {
    fn topic(&self) -> &str {
        match self {
            SyncEvent::ConnectivityChanged { .. } => "connectivity_changed",
            SyncEvent::Enqueued { .. } => "enqueued",
            SyncEvent::DrainCompleted(_) => "drain_completed",
            SyncEvent::PermanentFailure(_) => "permanent_failure",
            SyncEvent::PendingChanged { .. } => "pending_changed",
        }
    }
}

/// Clears the in-flight flag when the drain ends, even on early return.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncManager {
    store: Store,
    queue: SyncQueue,
    remote: Arc<dyn RemoteApi>,
    max_retries: u32,
    events: Arc<ListenerRegistry<SyncEvent>>,
    draining: AtomicBool,
}

impl SyncManager {
    pub fn new(
        store: Store,
        remote: Arc<dyn RemoteApi>,
        max_retries: u32,
        events: Arc<ListenerRegistry<SyncEvent>>,
    ) -> Self {
        Self {
            queue: SyncQueue::new(store.clone()),
            store,
            remote,
            max_retries: max_retries.max(1),
            events,
            draining: AtomicBool::new(false),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Replay every queued record once.
    ///
    /// Storage errors abort the cycle; records already applied stay removed.
    pub async fn drain(&self) -> Result<DrainOutcome> {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("Drain already in flight, skipping");
            return Ok(DrainOutcome::Skipped(SkipReason::InFlight));
        };

        let records = self.queue.pending()?;
        if records.is_empty() {
            tracing::debug!("Sync queue empty, nothing to drain");
            return Ok(DrainOutcome::Completed(DrainReport::default()));
        }

        tracing::info!("Draining {} pending mutations", records.len());
        let mut report = DrainReport {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            match self.remote.apply(&record).await {
                Ok(()) => {
                    self.queue.remove(&record.id)?;
                    report.succeeded += 1;
                    tracing::debug!("Applied {}", record.id);
                }
                Err(e) => {
                    report.failed += 1;
                    self.record_failure(&record, &e, &mut report)?;
                }
            }
        }

        self.store.put(LAST_SYNC_KEY, &Utc::now())?;
        tracing::info!(
            "Drain finished: {} succeeded, {} failed, {} dropped",
            report.succeeded,
            report.failed,
            report.dropped
        );

        self.events.emit(&SyncEvent::DrainCompleted(report));
        self.events.emit(&SyncEvent::PendingChanged {
            pending: self.queue.len()?,
        });
        Ok(DrainOutcome::Completed(report))
    }

    fn record_failure(
        &self,
        record: &MutationRecord,
        error: &depot_common::DepotError,
        report: &mut DrainReport,
    ) -> Result<()> {
        if !error.is_retryable() {
            if self.queue.remove(&record.id)? {
                let mut dropped = record.clone();
                dropped.retry_count += 1;
                report.dropped += 1;
                tracing::error!("Dropping {}, not retryable: {}", dropped.id, error);
                self.events.emit(&SyncEvent::PermanentFailure(dropped));
            }
            return Ok(());
        }

        match self.queue.mark_failed(&record.id, self.max_retries)? {
            Some(RetryState::Retrying(count)) => {
                tracing::warn!(
                    "Apply of {} failed (attempt {}/{}): {}",
                    record.id,
                    count,
                    self.max_retries,
                    error
                );
            }
            Some(RetryState::Exhausted(dropped)) => {
                report.dropped += 1;
                tracing::error!(
                    "Dropping {} after {} failed attempts: {}",
                    dropped.id,
                    dropped.retry_count,
                    error
                );
                self.events.emit(&SyncEvent::PermanentFailure(dropped));
            }
            None => {
                tracing::debug!("{} left the queue during drain", record.id);
            }
        }
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.queue.len()
    }

    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.get(LAST_SYNC_KEY)
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }
}
