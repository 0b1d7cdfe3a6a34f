use crate::store::{keys, KvStore};

/// Pending action for one admin, persisted as a single token string under
/// `state:<user_id>`. Exactly one state is active per admin; entering a new
/// flow overwrites whatever was pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminState {
    AwaitAddAdmin,
    AwaitBroadcastText,
    AwaitJoinChannel,
    /// Invite link captured, waiting for a forwarded channel message.
    AwaitJoinPrivate { invite: String },
    /// Channel id captured from a forward, waiting for the invite link.
    AwaitJoinPrivateWaitLink { chat_id: i64 },
    AwaitDisableCode,
    AwaitEnableCode,
    AwaitDeleteCode,
    AwaitInfoCode,
    Upload { code: String },
}

impl AdminState {
    pub fn encode(&self) -> String {
        match self {
            AdminState::AwaitAddAdmin => "await_add_admin".to_string(),
            AdminState::AwaitBroadcastText => "await_broadcast_text".to_string(),
            AdminState::AwaitJoinChannel => "await_join_channel".to_string(),
            AdminState::AwaitJoinPrivate { invite } => {
                format!("await_join_private:{}", invite)
            }
            AdminState::AwaitJoinPrivateWaitLink { chat_id } => {
                format!("await_join_private_wait_link:{}", chat_id)
            }
            AdminState::AwaitDisableCode => "await_disable_code".to_string(),
            AdminState::AwaitEnableCode => "await_enable_code".to_string(),
            AdminState::AwaitDeleteCode => "await_delete_code".to_string(),
            AdminState::AwaitInfoCode => "await_info_code".to_string(),
            AdminState::Upload { code } => format!("upload:{}", code),
        }
    }

    pub fn decode(token: &str) -> Option<AdminState> {
        match token {
            "await_add_admin" => return Some(AdminState::AwaitAddAdmin),
            "await_broadcast_text" => return Some(AdminState::AwaitBroadcastText),
            "await_join_channel" => return Some(AdminState::AwaitJoinChannel),
            "await_disable_code" => return Some(AdminState::AwaitDisableCode),
            "await_enable_code" => return Some(AdminState::AwaitEnableCode),
            "await_delete_code" => return Some(AdminState::AwaitDeleteCode),
            "await_info_code" => return Some(AdminState::AwaitInfoCode),
            _ => {}
        }
        // Parameterized tokens; the invite link itself contains colons, so
        // only the first separator splits.
        if let Some(invite) = token.strip_prefix("await_join_private:") {
            if !invite.is_empty() {
                return Some(AdminState::AwaitJoinPrivate {
                    invite: invite.to_string(),
                });
            }
        }
        if let Some(raw) = token.strip_prefix("await_join_private_wait_link:") {
            if let Ok(chat_id) = raw.parse::<i64>() {
                return Some(AdminState::AwaitJoinPrivateWaitLink { chat_id });
            }
        }
        if let Some(code) = token.strip_prefix("upload:") {
            if !code.is_empty() {
                return Some(AdminState::Upload {
                    code: code.to_string(),
                });
            }
        }
        None
    }

    /// States only an owner may consume; membership checked again at
    /// consumption time, not just when the state was set.
    pub fn owner_only(&self) -> bool {
        matches!(
            self,
            AdminState::AwaitAddAdmin
                | AdminState::AwaitBroadcastText
                | AdminState::AwaitJoinChannel
                | AdminState::AwaitJoinPrivate { .. }
                | AdminState::AwaitJoinPrivateWaitLink { .. }
        )
    }
}

pub fn get_state(store: &dyn KvStore, user_id: u64) -> Option<AdminState> {
    match store.get(&keys::state_key(user_id)) {
        Ok(Some(token)) => AdminState::decode(&token),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("Failed to load state for {}: {}", user_id, e);
            None
        }
    }
}

pub fn set_state(store: &dyn KvStore, user_id: u64, state: &AdminState) {
    if let Err(e) = store.put(&keys::state_key(user_id), &state.encode()) {
        tracing::warn!("Failed to set state for {}: {}", user_id, e);
    }
}

pub fn clear_state(store: &dyn KvStore, user_id: u64) {
    if let Err(e) = store.delete(&keys::state_key(user_id)) {
        tracing::warn!("Failed to clear state for {}: {}", user_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn encode_decode_roundtrips_every_variant() {
        let states = vec![
            AdminState::AwaitAddAdmin,
            AdminState::AwaitBroadcastText,
            AdminState::AwaitJoinChannel,
            AdminState::AwaitJoinPrivate {
                invite: "https://t.me/+AbC_d-123".to_string(),
            },
            AdminState::AwaitJoinPrivateWaitLink {
                chat_id: -1001234567890,
            },
            AdminState::AwaitDisableCode,
            AdminState::AwaitEnableCode,
            AdminState::AwaitDeleteCode,
            AdminState::AwaitInfoCode,
            AdminState::Upload {
                code: "ab3XyZ9k".to_string(),
            },
        ];
        for state in states {
            assert_eq!(AdminState::decode(&state.encode()), Some(state));
        }
    }

    #[test]
    fn invite_links_with_colons_survive_the_token_format() {
        let state = AdminState::AwaitJoinPrivate {
            invite: "https://t.me/+xyz".to_string(),
        };
        assert_eq!(state.encode(), "await_join_private:https://t.me/+xyz");
        assert_eq!(AdminState::decode(&state.encode()), Some(state));
    }

    #[test]
    fn unknown_or_malformed_tokens_decode_to_none() {
        assert_eq!(AdminState::decode(""), None);
        assert_eq!(AdminState::decode("bogus"), None);
        assert_eq!(AdminState::decode("upload:"), None);
        assert_eq!(AdminState::decode("await_join_private:"), None);
        assert_eq!(AdminState::decode("await_join_private_wait_link:abc"), None);
    }

    #[test]
    fn owner_only_covers_policy_and_broadcast_states() {
        assert!(AdminState::AwaitAddAdmin.owner_only());
        assert!(AdminState::AwaitBroadcastText.owner_only());
        assert!(AdminState::AwaitJoinChannel.owner_only());
        assert!(!AdminState::AwaitDisableCode.owner_only());
        assert!(!AdminState::Upload {
            code: "x".to_string()
        }
        .owner_only());
    }

    #[test]
    fn upload_session_collects_items_and_clears_on_finish() {
        use crate::registry::{self, MediaItem, MediaKind, Resolved};

        let store = MemoryStore::new();
        let code = registry::open_bundle(&store).unwrap();
        set_state(&store, 9, &AdminState::Upload { code: code.clone() });

        let item = |id: &str| MediaItem {
            kind: MediaKind::Photo,
            file_id: id.to_string(),
            caption: String::new(),
        };
        assert_eq!(registry::append_to_bundle(&store, &code, item("a")), 1);
        assert_eq!(registry::append_to_bundle(&store, &code, item("b")), 2);

        // Finish: the session state goes away, the bundle stays.
        clear_state(&store, 9);
        assert_eq!(get_state(&store, 9), None);
        match registry::resolve(&store, &code) {
            Resolved::Bundle(bundle) => {
                let ids: Vec<&str> = bundle.items.iter().map(|i| i.file_id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b"]);
            }
            other => panic!("expected bundle, got {:?}", other),
        }
    }

    #[test]
    fn starting_a_new_flow_overwrites_the_pending_one() {
        let store = MemoryStore::new();
        set_state(&store, 1, &AdminState::AwaitDisableCode);
        set_state(&store, 1, &AdminState::AwaitEnableCode);
        assert_eq!(get_state(&store, 1), Some(AdminState::AwaitEnableCode));
        clear_state(&store, 1);
        assert_eq!(get_state(&store, 1), None);
    }
}
