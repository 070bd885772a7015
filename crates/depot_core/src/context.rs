//! Explicitly owned sync runtime
//!
//! [`SyncContext`] wires the store, outbox, manager, connectivity monitor and
//! repositories together and runs the automatic drain triggers:
//!
//! - connectivity goes from offline to online
//! - a repository write is enqueued while online
//!
//! Manual drains go through [`SyncContext::sync_now`]. Everything stops on
//! [`SyncContext::shutdown`] (or drop).

use crate::connectivity::{ConnectivityMonitor, NetworkSource};
use crate::manager::{DrainOutcome, RemoteApi, SkipReason, SyncEvent, SyncManager};
use crate::queue::SyncQueue;
use crate::remote::SnapshotSource;
use crate::repository::Repository;
use crate::store::{SqliteStore, Store};
use chrono::{DateTime, Utc};
use depot_common::{
    Client, Collection, Entity, ListenerRegistry, Product, Result, Sale, StockMovement,
    SubscriptionId,
};
use depot_config::{Config, SyncConfig};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Point-in-time view of the sync state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub pending: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub draining: bool,
    pub auto_sync: bool,
}

pub struct SyncContext {
    store: Store,
    queue: SyncQueue,
    manager: Arc<SyncManager>,
    connectivity: Arc<ConnectivityMonitor>,
    events: Arc<ListenerRegistry<SyncEvent>>,
    kick: Arc<Notify>,
    auto_sync: bool,
    trigger_task: Mutex<Option<JoinHandle<()>>>,
    internal_subscriptions: Vec<SubscriptionId>,
    connectivity_subscription: SubscriptionId,
    clients: Repository<Client>,
    products: Repository<Product>,
    sales: Repository<Sale>,
    stock_movements: Repository<StockMovement>,
}

impl SyncContext {
    pub fn new(config: &SyncConfig, store: Store, remote: Arc<dyn RemoteApi>) -> Self {
        Self::with_monitor(config, store, remote, ConnectivityMonitor::new())
    }

    /// Build with a pre-seeded monitor (e.g. starting offline).
    pub fn with_monitor(
        config: &SyncConfig,
        store: Store,
        remote: Arc<dyn RemoteApi>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        let events = Arc::new(ListenerRegistry::new());
        let manager = Arc::new(SyncManager::new(
            store.clone(),
            remote,
            config.max_retries,
            Arc::clone(&events),
        ));
        let connectivity = Arc::new(monitor);
        let kick = Arc::new(Notify::new());

        let forward = Arc::clone(&events);
        let connectivity_subscription = connectivity.subscribe(move |online| {
            forward.emit(&SyncEvent::ConnectivityChanged { online });
        });

        let waker = Arc::clone(&kick);
        let on_enqueue = events.subscribe("enqueued", move |_: &SyncEvent| waker.notify_one());

        Self {
            queue: SyncQueue::new(store.clone()),
            clients: Repository::new(store.clone(), Arc::clone(&events)),
            products: Repository::new(store.clone(), Arc::clone(&events)),
            sales: Repository::new(store.clone(), Arc::clone(&events)),
            stock_movements: Repository::new(store.clone(), Arc::clone(&events)),
            store,
            manager,
            connectivity,
            events,
            kick,
            auto_sync: config.auto_sync,
            trigger_task: Mutex::new(None),
            internal_subscriptions: vec![on_enqueue],
            connectivity_subscription,
        }
    }

    /// Open the SQLite store named by `config`.
    pub fn open(config: &Config, remote: Arc<dyn RemoteApi>) -> Result<Self> {
        let store = Store::new(SqliteStore::open(&config.storage_path())?);
        Ok(Self::new(&config.sync, store, remote))
    }

    /// Attach the network source and start the automatic triggers.
    pub fn initialize(&self, source: Arc<dyn NetworkSource>) {
        self.connectivity.initialize(source);
        if !self.auto_sync {
            tracing::debug!("Auto sync disabled; drains run only on request");
            return;
        }

        let mut task = self.trigger_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }

        let manager = Arc::clone(&self.manager);
        let kick = Arc::clone(&self.kick);
        let mut watch = self.connectivity.watch();
        // Read before spawning so a transition racing the first poll is
        // still seen as a change.
        let mut was_online = watch.borrow_and_update().is_online;
        *task = Some(tokio::spawn(async move {
            loop {
                let should_drain = tokio::select! {
                    changed = watch.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = watch.borrow_and_update().is_online;
                        let reconnected = online && !was_online;
                        was_online = online;
                        if reconnected {
                            tracing::info!("Connectivity restored, draining outbox");
                        }
                        reconnected
                    }
                    _ = kick.notified() => was_online,
                };

                if should_drain {
                    if let Err(e) = manager.drain().await {
                        tracing::error!("Automatic drain failed: {}", e);
                    }
                }
            }
        }));
    }

    /// Stop the triggers and detach the network source.
    pub fn shutdown(&self) {
        let task = self
            .trigger_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        self.connectivity.shutdown();
        tracing::debug!("Sync context shut down");
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn pending_sync_count(&self) -> Result<usize> {
        self.manager.pending_count()
    }

    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.manager.last_sync_time()
    }

    /// Drain now unless offline or a drain is already running.
    pub async fn sync_now(&self) -> Result<DrainOutcome> {
        if !self.is_online() {
            tracing::info!("Offline, sync postponed");
            return Ok(DrainOutcome::Skipped(SkipReason::Offline));
        }
        self.manager.drain().await
    }

    pub fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            is_online: self.is_online(),
            pending: self.pending_sync_count()?,
            last_sync: self.last_sync_time()?,
            draining: self.manager.is_draining(),
            auto_sync: self.auto_sync,
        })
    }

    /// Seed local collections from the backend.
    ///
    /// Nothing is pulled unless the backend reports itself healthy. Collections with pending local mutations are left untouched so
    /// unsynced writes are never overwritten. Fetch failures skip that
    /// collection. Returns the collections seeded and their sizes.
    pub async fn initial_sync(
        &self,
        source: &dyn SnapshotSource,
    ) -> Result<Vec<(Collection, usize)>> {
        if !self.is_online() {
            tracing::info!("Offline, initial sync skipped");
            return Ok(Vec::new());
        }
        if !source.health().await {
            tracing::warn!("Backend is not healthy, initial sync skipped");
            return Ok(Vec::new());
        }

        let mut seeded = Vec::new();
        if let Some(n) = seed(&self.clients, &self.queue, source).await? {
            seeded.push((Collection::Clients, n));
        }
        if let Some(n) = seed(&self.products, &self.queue, source).await? {
            seeded.push((Collection::Products, n));
        }
        if let Some(n) = seed(&self.sales, &self.queue, source).await? {
            seeded.push((Collection::Sales, n));
        }
        if let Some(n) = seed(&self.stock_movements, &self.queue, source).await? {
            seeded.push((Collection::StockMovements, n));
        }
        Ok(seeded)
    }

    /// Subscribe to sync events by topic (`"*"` for all).
    pub fn on<F>(&self, topic: &str, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(topic, listener)
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        if self.internal_subscriptions.contains(&id) {
            return false;
        }
        self.events.unsubscribe(id)
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn clients(&self) -> &Repository<Client> {
        &self.clients
    }

    pub fn products(&self) -> &Repository<Product> {
        &self.products
    }

    pub fn sales(&self) -> &Repository<Sale> {
        &self.sales
    }

    pub fn stock_movements(&self) -> &Repository<StockMovement> {
        &self.stock_movements
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        self.connectivity.unsubscribe(self.connectivity_subscription);
        self.shutdown();
    }
}

async fn seed<T: Entity>(
    repository: &Repository<T>,
    queue: &SyncQueue,
    source: &dyn SnapshotSource,
) -> Result<Option<usize>> {
    let collection = T::COLLECTION;
    if queue.pending_for(collection)? > 0 {
        tracing::info!("{} has pending changes, keeping local copy", collection);
        return Ok(None);
    }

    let items = match source.fetch_snapshot(collection).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!("Could not fetch {}: {}", collection, e);
            return Ok(None);
        }
    };

    let entities: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!("Skipping malformed {} record: {}", collection, e);
                None
            }
        })
        .collect();

    repository.replace_all(&entities)?;
    tracing::info!("Seeded {} with {} records", collection, entities.len());
    Ok(Some(entities.len()))
}
