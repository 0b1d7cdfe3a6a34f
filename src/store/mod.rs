use std::sync::Arc;

use crate::db::DbError;

pub mod keys;
pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One page of a cursor-paginated prefix scan. A `None` cursor means the
/// scan is complete; anything else must be fed back into `list_prefix`.
#[derive(Debug)]
pub struct KeyPage {
    pub keys: Vec<String>,
    pub cursor: Option<String>,
}

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Poisoned,
    Unavailable,
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::Db(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Db(e) => write!(f, "Store database error: {}", e),
            StoreError::Poisoned => write!(f, "Store lock poisoned"),
            StoreError::Unavailable => write!(f, "Store unavailable"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Key/value abstraction over durable storage. Every operation is atomic on
/// its own key; there are no cross-key transactions, so read-modify-write
/// sequences over a single key are last-write-wins under concurrency.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn list_prefix(&self, prefix: &str, cursor: Option<&str>) -> Result<KeyPage, StoreError>;
}

pub type Store = Arc<dyn KvStore>;

/// Collects every key under a prefix, looping the cursor protocol to
/// completion. Degrades to an empty list when the store fails.
pub fn scan_prefix(store: &dyn KvStore, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        match store.list_prefix(prefix, cursor.as_deref()) {
            Ok(page) => {
                keys.extend(page.keys);
                match page.cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            Err(e) => {
                tracing::warn!("Prefix scan failed for {}: {}", prefix, e);
                break;
            }
        }
    }
    keys
}

pub fn count_prefix(store: &dyn KvStore, prefix: &str) -> usize {
    scan_prefix(store, prefix).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_loops_through_multiple_pages() {
        let store = MemoryStore::with_page_size(3);
        for i in 0..10 {
            store.put(&format!("user:{}", i), "1").unwrap();
        }
        store.put("media:x", "{}").unwrap();

        assert_eq!(count_prefix(&store, "user:"), 10);
        assert_eq!(count_prefix(&store, "media:"), 1);
        assert_eq!(count_prefix(&store, "bundle:"), 0);
    }

    #[test]
    fn scan_returns_keys_in_order() {
        let store = MemoryStore::with_page_size(2);
        store.put("user:3", "1").unwrap();
        store.put("user:1", "1").unwrap();
        store.put("user:2", "1").unwrap();

        let keys = scan_prefix(&store, "user:");
        assert_eq!(keys, vec!["user:1", "user:2", "user:3"]);
    }
}
