//! Key namespaces used in the KV store.

pub const MEDIA_PREFIX: &str = "media:";
pub const BUNDLE_PREFIX: &str = "bundle:";
pub const USER_PREFIX: &str = "user:";
pub const STATE_PREFIX: &str = "state:";
pub const RMJOIN_PREFIX: &str = "tmp:rmjoin:";

pub const CONFIG_ADMINS: &str = "config:admins";
pub const CONFIG_FORCE_JOIN: &str = "config:force_join_channel";
pub const CONFIG_BOT_USERNAME: &str = "config:bot_username";

pub fn media_key(code: &str) -> String {
    format!("{}{}", MEDIA_PREFIX, code)
}

pub fn bundle_key(code: &str) -> String {
    format!("{}{}", BUNDLE_PREFIX, code)
}

pub fn user_key(user_id: u64) -> String {
    format!("{}{}", USER_PREFIX, user_id)
}

pub fn state_key(user_id: u64) -> String {
    format!("{}{}", STATE_PREFIX, user_id)
}

pub fn rmjoin_key(user_id: u64) -> String {
    format!("{}{}", RMJOIN_PREFIX, user_id)
}

/// Extracts the user id from a `user:<id>` key.
pub fn user_id_from_key(key: &str) -> Option<u64> {
    key.strip_prefix(USER_PREFIX)?.parse().ok()
}
