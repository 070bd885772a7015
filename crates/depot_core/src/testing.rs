//! In-process fakes for the remote backend

use crate::manager::RemoteApi;
use crate::queue::MutationRecord;
use crate::remote::SnapshotSource;
use async_trait::async_trait;
use depot_common::{Collection, DepotError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Remote whose answers are scripted per call
///
/// Queued outcomes are consumed first; once they run out every call gets
/// the default answer.
pub struct ScriptedRemote {
    default_ok: AtomicBool,
    healthy: AtomicBool,
    outcomes: Mutex<VecDeque<bool>>,
    rejected: Mutex<Vec<String>>,
    delay: Option<Duration>,
    attempts: AtomicUsize,
    applied: Mutex<Vec<MutationRecord>>,
    snapshots: Mutex<HashMap<Collection, Vec<serde_json::Value>>>,
}

impl ScriptedRemote {
    fn with_default(ok: bool) -> Self {
        Self {
            default_ok: AtomicBool::new(ok),
            healthy: AtomicBool::new(true),
            outcomes: Mutex::new(VecDeque::new()),
            rejected: Mutex::new(Vec::new()),
            delay: None,
            attempts: AtomicUsize::new(0),
            applied: Mutex::new(Vec::new()),
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_default(true)
    }

    pub fn failing() -> Self {
        Self::with_default(false)
    }

    /// Sleep this long inside every `apply`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_default(&self, ok: bool) {
        self.default_ok.store(ok, Ordering::SeqCst);
    }

    pub fn push_outcomes(&self, outcomes: &[bool]) {
        lock(&self.outcomes).extend(outcomes.iter().copied());
    }

    /// Answer `health()` with `healthy`; starts out healthy
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Refuse the mutation `id` with a validation error on every attempt
    pub fn reject(&self, id: &str) {
        lock(&self.rejected).push(id.to_string());
    }

    pub fn set_snapshot(&self, collection: Collection, items: Vec<serde_json::Value>) {
        lock(&self.snapshots).insert(collection, items);
    }

    /// Records that were accepted, in call order
    pub fn applied(&self) -> Vec<MutationRecord> {
        lock(&self.applied).clone()
    }

    pub fn applied_ids(&self) -> Vec<String> {
        lock(&self.applied).iter().map(|r| r.id.clone()).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn apply(&self, record: &MutationRecord) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if lock(&self.rejected).contains(&record.id) {
            return Err(DepotError::ValidationError(format!("{} rejected", record.id)));
        }

        let ok = lock(&self.outcomes)
            .pop_front()
            .unwrap_or_else(|| self.default_ok.load(Ordering::SeqCst));
        if ok {
            lock(&self.applied).push(record.clone());
            Ok(())
        } else {
            Err(DepotError::NetworkError(format!("scripted failure for {}", record.id)))
        }
    }
}

#[async_trait]
impl SnapshotSource for ScriptedRemote {
    async fn health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn fetch_snapshot(&self, collection: Collection) -> Result<Vec<serde_json::Value>> {
        Ok(lock(&self.snapshots)
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
