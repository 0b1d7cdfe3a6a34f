use crate::access::AdminSet;
use crate::config::AppConfig;
use crate::force_join::{self, ForceJoinRule};
use crate::store::KvStore;

/// Everything an update handler needs that lives in the store, loaded once
/// at the top of request handling and passed down. Nothing here survives
/// between updates.
pub struct RequestContext {
    pub admins: AdminSet,
    pub rules: Vec<ForceJoinRule>,
}

impl RequestContext {
    pub fn load(store: &dyn KvStore, config: &AppConfig) -> Self {
        RequestContext {
            admins: AdminSet::load(store, &config.owner_ids),
            rules: force_join::load_rules(store),
        }
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.admins.is_owner(user_id)
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admins.is_admin(user_id)
    }
}
