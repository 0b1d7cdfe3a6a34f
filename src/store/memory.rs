use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{KeyPage, KvStore, StoreError};

const DEFAULT_PAGE_SIZE: usize = 100;

/// In-memory store used by unit tests and local experiments. Mirrors the
/// paginated prefix-scan protocol of the Postgres-backed store.
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        MemoryStore {
            entries: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn list_prefix(&self, prefix: &str, cursor: Option<&str>) -> Result<KeyPage, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| cursor.map(|c| k.as_str() > c).unwrap_or(true))
            .take(self.page_size)
            .cloned()
            .collect();
        let cursor = if keys.len() == self.page_size {
            keys.last().cloned()
        } else {
            None
        };
        Ok(KeyPage { keys, cursor })
    }
}

/// Store stub whose every operation fails, for exercising the degraded paths.
#[cfg(test)]
pub struct BrokenStore;

#[cfg(test)]
impl KvStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable)
    }

    fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }

    fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable)
    }

    fn list_prefix(&self, _prefix: &str, _cursor: Option<&str>) -> Result<KeyPage, StoreError> {
        Err(StoreError::Unavailable)
    }
}
