//! Per-entity local access
//!
//! Each collection is one JSON array in the store. Writes commit the new
//! snapshot and the matching outbox record in a single transaction, then
//! announce the enqueue so the sync trigger can react.

use crate::manager::SyncEvent;
use crate::queue::{Operation, SyncQueue};
use crate::store::Store;
use depot_common::{DepotError, Entity, ListenerRegistry, Result};
use std::marker::PhantomData;
use std::sync::Arc;

pub struct Repository<T: Entity> {
    store: Store,
    events: Arc<ListenerRegistry<SyncEvent>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            events: Arc::clone(&self.events),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(store: Store, events: Arc<ListenerRegistry<SyncEvent>>) -> Self {
        Self {
            store,
            events,
            _entity: PhantomData,
        }
    }

    fn key() -> &'static str {
        T::COLLECTION.as_str()
    }

    /// Local snapshot; never waits on the network
    pub fn list(&self) -> Result<Vec<T>> {
        Ok(self.store.get(Self::key())?.unwrap_or_default())
    }

    pub fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.list()?.into_iter().find(|entity| entity.id() == id))
    }

    /// Append `entity` and queue a create. Returns the mutation id.
    pub fn add(&self, entity: T) -> Result<String> {
        self.write(Operation::Create, entity, |items, entity| {
            items.push(entity);
            Ok(())
        })
    }

    /// Replace the entity with the same id and queue an update.
    pub fn update(&self, entity: T) -> Result<String> {
        self.write(Operation::Update, entity, |items, entity| {
            let slot = items
                .iter_mut()
                .find(|existing| existing.id() == entity.id())
                .ok_or_else(|| DepotError::NotFound {
                    collection: T::COLLECTION,
                    id: entity.id().to_string(),
                })?;
            *slot = entity;
            Ok(())
        })
    }

    /// Overwrite the local snapshot without queueing anything.
    pub fn replace_all(&self, entities: &[T]) -> Result<()> {
        self.store.put(Self::key(), &entities)?;
        tracing::debug!("Replaced {} with {} records", Self::key(), entities.len());
        Ok(())
    }

    fn write(
        &self,
        operation: Operation,
        entity: T,
        apply: impl FnOnce(&mut Vec<T>, T) -> Result<()>,
    ) -> Result<String> {
        let payload = serde_json::to_value(&entity)?;

        let record = self.store.transaction(|tx| {
            let mut items: Vec<T> = tx.get(Self::key())?.unwrap_or_default();
            apply(&mut items, entity)?;
            tx.put(Self::key(), &items)?;
            SyncQueue::enqueue_in(tx, operation, T::COLLECTION, payload)
        })?;

        self.events.emit(&SyncEvent::Enqueued {
            id: record.id.clone(),
            collection: record.collection,
            operation: record.operation,
        });
        Ok(record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use depot_common::{Client, Collection, Product};

    fn setup() -> (MemoryStore, Store, Arc<ListenerRegistry<SyncEvent>>) {
        let backend = MemoryStore::new();
        let store = Store::new(backend.clone());
        (backend, store, Arc::new(ListenerRegistry::new()))
    }

    #[test]
    fn test_add_stores_entity_and_queues_create() {
        let (_, store, events) = setup();
        let clients: Repository<Client> = Repository::new(store.clone(), events);

        let id = clients.add(Client::new("c1", "Ana")).unwrap();

        assert_eq!(clients.list().unwrap().len(), 1);
        let pending = SyncQueue::new(store).pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].operation, Operation::Create);
        assert_eq!(pending[0].payload["name"], "Ana");
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let (_, store, events) = setup();
        let products: Repository<Product> = Repository::new(store.clone(), events);

        let err = products.update(Product::new("p404", "Ghost", 1.0)).unwrap_err();
        assert!(matches!(
            err,
            DepotError::NotFound { collection: Collection::Products, .. }
        ));
        assert!(SyncQueue::new(store).is_empty().unwrap());
    }

    #[test]
    fn test_update_replaces_in_place() {
        let (_, store, events) = setup();
        let products: Repository<Product> = Repository::new(store, events);
        products.add(Product::new("p1", "Rice", 2.5)).unwrap();

        let mut changed = Product::new("p1", "Rice 5kg", 11.0);
        changed.stock = 4;
        products.update(changed).unwrap();

        let stored = products.get("p1").unwrap().unwrap();
        assert_eq!(stored.name, "Rice 5kg");
        assert_eq!(stored.stock, 4);
        assert_eq!(products.list().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_write_rolls_back_entity_and_queue() {
        let (backend, store, events) = setup();
        let clients: Repository<Client> = Repository::new(store.clone(), events);
        clients.add(Client::new("c1", "Ana")).unwrap();

        backend.set_fail_writes(true);
        assert!(clients.add(Client::new("c2", "Luis")).is_err());
        backend.set_fail_writes(false);

        assert_eq!(clients.list().unwrap().len(), 1);
        assert_eq!(SyncQueue::new(store).len().unwrap(), 1);
    }

    #[test]
    fn test_replace_all_does_not_enqueue() {
        let (_, store, events) = setup();
        let clients: Repository<Client> = Repository::new(store.clone(), events);

        clients
            .replace_all(&[Client::new("c1", "Ana"), Client::new("c2", "Luis")])
            .unwrap();

        assert_eq!(clients.list().unwrap().len(), 2);
        assert!(SyncQueue::new(store).is_empty().unwrap());
    }

    #[test]
    fn test_write_announces_enqueue() {
        let (_, store, events) = setup();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        events.subscribe("enqueued", move |event: &SyncEvent| {
            s.lock().unwrap().push(event.clone());
        });

        let clients: Repository<Client> = Repository::new(store, events);
        let id = clients.add(Client::new("c1", "Ana")).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SyncEvent::Enqueued {
                id,
                collection: Collection::Clients,
                operation: Operation::Create,
            }]
        );
    }
}
