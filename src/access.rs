use std::collections::BTreeSet;

use crate::store::{keys, KvStore};

/// Union of the deployment-configured owners and the dynamically managed
/// extra admins (`config:admins`, stored as a comma-joined id list). Owners
/// are always admins; only owners may grow the extra set.
#[derive(Debug, Clone)]
pub struct AdminSet {
    owners: BTreeSet<u64>,
    extras: BTreeSet<u64>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AddAdminError {
    InvalidId,
    StoreFailed,
}

impl std::fmt::Display for AddAdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddAdminError::InvalidId => write!(f, "invalid admin id"),
            AddAdminError::StoreFailed => write!(f, "admin set could not be saved"),
        }
    }
}

impl std::error::Error for AddAdminError {}

impl AdminSet {
    /// Loads the extra-admin set from the store. A store failure degrades to
    /// owners-only rather than locking everyone out.
    pub fn load(store: &dyn KvStore, owners: &[u64]) -> Self {
        let extras = match store.get(keys::CONFIG_ADMINS) {
            Ok(Some(raw)) => parse_id_list(&raw),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                tracing::warn!("Failed to load extra admins: {}", e);
                BTreeSet::new()
            }
        };
        AdminSet {
            owners: owners.iter().copied().collect(),
            extras,
        }
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owners.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.owners.contains(&user_id) || self.extras.contains(&user_id)
    }

    /// All admin ids (owners first, then extras), without duplicates.
    pub fn all(&self) -> Vec<u64> {
        let mut out: Vec<u64> = self.owners.iter().copied().collect();
        out.extend(self.extras.iter().filter(|id| !self.owners.contains(id)));
        out
    }
}

/// Validates and persists a new extra admin. Input must be a bare numeric id.
/// Read-modify-write on `config:admins` is last-write-wins (documented race).
pub fn add_admin(store: &dyn KvStore, raw: &str) -> Result<u64, AddAdminError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(AddAdminError::InvalidId);
    }
    let id: u64 = trimmed.parse().map_err(|_| AddAdminError::InvalidId)?;

    let mut set = match store.get(keys::CONFIG_ADMINS) {
        Ok(Some(current)) => parse_id_list(&current),
        Ok(None) => BTreeSet::new(),
        Err(_) => return Err(AddAdminError::StoreFailed),
    };
    set.insert(id);

    let joined = set
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    store
        .put(keys::CONFIG_ADMINS, &joined)
        .map_err(|_| AddAdminError::StoreFailed)?;
    Ok(id)
}

fn parse_id_list(raw: &str) -> BTreeSet<u64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::BrokenStore;
    use crate::store::MemoryStore;

    #[test]
    fn owners_are_always_admins() {
        let store = MemoryStore::new();
        let admins = AdminSet::load(&store, &[10, 20]);
        assert!(admins.is_owner(10));
        assert!(admins.is_admin(10));
        assert!(admins.is_admin(20));
        assert!(!admins.is_admin(30));
    }

    #[test]
    fn extra_admins_are_admins_but_not_owners() {
        let store = MemoryStore::new();
        add_admin(&store, "30").unwrap();
        let admins = AdminSet::load(&store, &[10]);
        assert!(admins.is_admin(30));
        assert!(!admins.is_owner(30));
    }

    #[test]
    fn add_admin_rejects_non_numeric_input() {
        let store = MemoryStore::new();
        assert_eq!(add_admin(&store, "abc"), Err(AddAdminError::InvalidId));
        assert_eq!(add_admin(&store, "12 34"), Err(AddAdminError::InvalidId));
        assert_eq!(add_admin(&store, ""), Err(AddAdminError::InvalidId));
        assert_eq!(add_admin(&store, "-5"), Err(AddAdminError::InvalidId));
        assert_eq!(store.get(keys::CONFIG_ADMINS).unwrap(), None);
    }

    #[test]
    fn add_admin_is_idempotent() {
        let store = MemoryStore::new();
        add_admin(&store, "42").unwrap();
        add_admin(&store, "42").unwrap();
        assert_eq!(
            store.get(keys::CONFIG_ADMINS).unwrap(),
            Some("42".to_string())
        );
    }

    #[test]
    fn add_admin_reports_store_failure() {
        assert_eq!(
            add_admin(&BrokenStore, "42"),
            Err(AddAdminError::StoreFailed)
        );
    }

    #[test]
    fn all_lists_owners_and_extras_without_duplicates() {
        let store = MemoryStore::new();
        add_admin(&store, "10").unwrap();
        add_admin(&store, "30").unwrap();
        let admins = AdminSet::load(&store, &[10, 20]);
        assert_eq!(admins.all(), vec![10, 20, 30]);
    }

    #[test]
    fn load_degrades_to_owners_on_store_failure() {
        let admins = AdminSet::load(&BrokenStore, &[10]);
        assert!(admins.is_admin(10));
        assert_eq!(admins.all(), vec![10]);
    }
}
