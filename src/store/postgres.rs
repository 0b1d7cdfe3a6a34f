use diesel::prelude::*;

use super::{KeyPage, KvStore, StoreError};
use crate::db::{DbError, DbPool};
use crate::models::NewKvEntry;

const PAGE_SIZE: i64 = 1000;

/// Durable store backed by a single `kv_entries` table. Each method grabs a
/// pooled connection and performs one statement, so per-key atomicity comes
/// straight from Postgres.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }
}

impl KvStore for PgStore {
    fn get(&self, k: &str) -> Result<Option<String>, StoreError> {
        use crate::schema::kv_entries::dsl::*;

        let conn = &mut self.pool.get().map_err(DbError::from)?;
        let result = kv_entries
            .filter(key.eq(k))
            .select(value)
            .first::<String>(conn)
            .optional()
            .map_err(DbError::from)?;
        Ok(result)
    }

    fn put(&self, k: &str, v: &str) -> Result<(), StoreError> {
        use crate::schema::kv_entries::dsl::*;

        let conn = &mut self.pool.get().map_err(DbError::from)?;
        diesel::insert_into(kv_entries)
            .values(&NewKvEntry { key: k, value: v })
            .on_conflict(key)
            .do_update()
            .set(value.eq(v))
            .execute(conn)
            .map_err(DbError::from)?;
        Ok(())
    }

    fn delete(&self, k: &str) -> Result<(), StoreError> {
        use crate::schema::kv_entries::dsl::*;

        let conn = &mut self.pool.get().map_err(DbError::from)?;
        diesel::delete(kv_entries.filter(key.eq(k)))
            .execute(conn)
            .map_err(DbError::from)?;
        Ok(())
    }

    fn list_prefix(&self, prefix: &str, cursor: Option<&str>) -> Result<KeyPage, StoreError> {
        use crate::schema::kv_entries::dsl::*;

        let conn = &mut self.pool.get().map_err(DbError::from)?;
        let pattern = format!("{}%", escape_like(prefix));

        let mut query = kv_entries
            .filter(key.like(pattern))
            .select(key)
            .order(key.asc())
            .limit(PAGE_SIZE)
            .into_boxed();
        if let Some(after) = cursor {
            query = query.filter(key.gt(after.to_string()));
        }

        let keys = query.load::<String>(conn).map_err(DbError::from)?;
        let cursor = if keys.len() as i64 == PAGE_SIZE {
            keys.last().cloned()
        } else {
            None
        };
        Ok(KeyPage { keys, cursor })
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_like_metacharacters() {
        assert_eq!(escape_like("user:"), "user:");
        assert_eq!(escape_like("a%b_c"), "a\\%b\\_c");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
