use super::DurableStore;
use depot_common::{DepotError, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-process backend. Clones share the same data, so dropping every
/// [`super::Store`] built on it and building a new one behaves like a
/// process restart against the same disk.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Vec<u8>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, as a full or read-only disk would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().entries.get(key).cloned())
    }

    fn write_batch(&self, writes: &[(String, Option<Vec<u8>>)]) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_writes {
            return Err(DepotError::Storage("write rejected (fault injected)".into()));
        }
        for (key, value) in writes {
            match value {
                Some(bytes) => {
                    inner.entries.insert(key.clone(), bytes.clone());
                }
                None => {
                    inner.entries.remove(key);
                }
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().entries.keys().cloned().collect())
    }
}
