//! Durable key/value store
//!
//! Collections, the sync queue and scalar settings are each persisted as one
//! JSON value under a fixed key. Every write goes through
//! [`Store::transaction`], which serializes read-modify-write cycles and
//! commits all staged keys in a single atomic batch.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use depot_common::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Key of the free-form application settings object
pub const SETTINGS_KEY: &str = "app_settings";

/// Raw byte-level persistence backend
pub trait DurableStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Apply every write or none of them. `None` deletes the key.
    fn write_batch(&self, writes: &[(String, Option<Vec<u8>>)]) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// Typed JSON view over a [`DurableStore`], cheap to clone
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn DurableStore>,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    pub fn new(backend: impl DurableStore + 'static) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn DurableStore>) -> Self {
        Self {
            backend,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        decode(self.backend.read(key)?)
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.transaction(|tx| tx.put(key, value))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.transaction(|tx| {
            tx.remove(key);
            Ok(())
        })
    }

    /// Run `f` with exclusive write access and commit its staged writes.
    ///
    /// Nothing is persisted when `f` or the commit fails.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut Transaction<'_>) -> Result<R>) -> Result<R> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut tx = Transaction {
            backend: self.backend.as_ref(),
            staged: BTreeMap::new(),
        };
        let result = f(&mut tx)?;

        if !tx.staged.is_empty() {
            let writes: Vec<_> = tx.staged.into_iter().collect();
            self.backend.write_batch(&writes)?;
        }
        Ok(result)
    }

    /// Load `key` (or its default), mutate it, and store it back atomically.
    pub fn update<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        self.transaction(|tx| {
            let mut value: T = tx.get(key)?.unwrap_or_default();
            let result = f(&mut value);
            tx.put(key, &value)?;
            Ok(result)
        })
    }

    pub fn settings(&self) -> Result<serde_json::Value> {
        Ok(self
            .get(SETTINGS_KEY)?
            .unwrap_or_else(|| serde_json::Value::Object(Default::default())))
    }

    pub fn save_settings(&self, settings: &serde_json::Value) -> Result<()> {
        self.put(SETTINGS_KEY, settings)
    }

    /// Remove every key
    pub fn clear(&self) -> Result<()> {
        let cleared = self.transaction(|tx| {
            let keys = tx.keys()?;
            for key in &keys {
                tx.remove(key);
            }
            Ok(keys.len())
        })?;
        tracing::info!("Store cleared ({} keys)", cleared);
        Ok(())
    }
}

/// Staged writes of one [`Store::transaction`]; reads see staged values
pub struct Transaction<'a> {
    backend: &'a dyn DurableStore,
    staged: BTreeMap<String, Option<Vec<u8>>>,
}

impl Transaction<'_> {
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.staged.get(key) {
            Some(staged) => decode(staged.clone()),
            None => decode(self.backend.read(key)?),
        }
    }

    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.staged.insert(key.to_string(), Some(bytes));
        Ok(())
    }

    pub fn remove(&mut self, key: &str) {
        self.staged.insert(key.to_string(), None);
    }

    /// Persisted keys overlaid with the staged writes, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut keys: BTreeMap<String, ()> = self
            .backend
            .keys()?
            .into_iter()
            .map(|key| (key, ()))
            .collect();
        for (key, value) in &self.staged {
            match value {
                Some(_) => keys.insert(key.clone(), ()),
                None => keys.remove(key),
            };
        }
        Ok(keys.into_keys().collect())
    }
}

fn decode<T: DeserializeOwned>(bytes: Option<Vec<u8>>) -> Result<Option<T>> {
    match bytes {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_common::DepotError;

    #[test]
    fn test_get_missing_key_is_none() {
        let store = Store::new(MemoryStore::new());
        let value: Option<Vec<String>> = store.get("clients").unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_update_starts_from_default() {
        let store = Store::new(MemoryStore::new());
        let len = store
            .update("numbers", |v: &mut Vec<u32>| {
                v.push(7);
                v.len()
            })
            .unwrap();
        assert_eq!(len, 1);
        assert_eq!(store.get::<Vec<u32>>("numbers").unwrap(), Some(vec![7]));
    }

    #[test]
    fn test_transaction_reads_its_own_writes() {
        let store = Store::new(MemoryStore::new());
        store
            .transaction(|tx| {
                tx.put("a", &1u32)?;
                assert_eq!(tx.get::<u32>("a")?, Some(1));
                tx.remove("a");
                assert_eq!(tx.get::<u32>("a")?, None);
                tx.put("b", &2u32)
            })
            .unwrap();

        assert_eq!(store.get::<u32>("a").unwrap(), None);
        assert_eq!(store.get::<u32>("b").unwrap(), Some(2));
    }

    #[test]
    fn test_failed_transaction_persists_nothing() {
        let store = Store::new(MemoryStore::new());
        let result: Result<()> = store.transaction(|tx| {
            tx.put("a", &1u32)?;
            Err(DepotError::ValidationError("abort".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.get::<u32>("a").unwrap(), None);
    }

    #[test]
    fn test_settings_default_to_empty_object() {
        let store = Store::new(MemoryStore::new());
        assert_eq!(store.settings().unwrap(), serde_json::json!({}));

        store
            .save_settings(&serde_json::json!({ "theme": "dark" }))
            .unwrap();
        assert_eq!(store.settings().unwrap()["theme"], "dark");
    }

    #[test]
    fn test_clear_removes_all_keys() {
        let backend = MemoryStore::new();
        let store = Store::new(backend.clone());
        store.put("a", &1u32).unwrap();
        store.put("b", &2u32).unwrap();

        store.clear().unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }

    /// Backend that notes whether the store's write lock was held when
    /// its keys were listed
    struct LockAwareStore {
        inner: MemoryStore,
        write_lock: Mutex<Option<Arc<Mutex<()>>>>,
        listed_unlocked: Mutex<usize>,
    }

    impl DurableStore for LockAwareStore {
        fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.read(key)
        }

        fn write_batch(&self, writes: &[(String, Option<Vec<u8>>)]) -> Result<()> {
            self.inner.write_batch(writes)
        }

        fn keys(&self) -> Result<Vec<String>> {
            if let Some(lock) = self.write_lock.lock().unwrap().as_ref() {
                if lock.try_lock().is_ok() {
                    *self.listed_unlocked.lock().unwrap() += 1;
                }
            }
            self.inner.keys()
        }
    }

    #[test]
    fn test_clear_lists_keys_under_the_write_lock() {
        let backend = Arc::new(LockAwareStore {
            inner: MemoryStore::new(),
            write_lock: Mutex::new(None),
            listed_unlocked: Mutex::new(0),
        });
        let store = Store::from_arc(backend.clone());
        *backend.write_lock.lock().unwrap() = Some(store.write_lock.clone());

        store.put("clients", &vec!["c1"]).unwrap();
        store.put("sync_queue", &Vec::<String>::new()).unwrap();
        store.clear().unwrap();

        assert_eq!(*backend.listed_unlocked.lock().unwrap(), 0);
        assert!(backend.inner.keys().unwrap().is_empty());
    }

    #[test]
    fn test_transaction_keys_include_staged_writes() {
        let store = Store::new(MemoryStore::new());
        store.put("a", &1u32).unwrap();
        store.put("b", &2u32).unwrap();

        let keys = store
            .transaction(|tx| {
                tx.remove("a");
                tx.put("c", &3u32)?;
                tx.keys()
            })
            .unwrap();
        assert_eq!(keys, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_corrupt_value_is_an_error() {
        let backend = MemoryStore::new();
        backend
            .write_batch(&[("clients".to_string(), Some(b"{not json".to_vec()))])
            .unwrap();
        let store = Store::new(backend);

        assert!(matches!(
            store.get::<Vec<String>>("clients"),
            Err(DepotError::JsonError(_))
        ));
    }
}
